//! Pipeline configuration.
//!
//! Two layers:
//!
//! * [`Settings`] mirrors the `settings.json` file shared with the external
//!   training scripts.  Method families are plain strings there and every key
//!   the pipeline does not recognise is kept as an opaque model hyperparameter.
//! * [`PipelineConfig`] is what every component receives.  It is produced once
//!   by [`Settings::resolve`], which turns method names into closed enums and
//!   validates the numeric parameters.  Nothing downstream reads the settings
//!   file again.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::drift::DriftCorrection;
use crate::error::PipelineError;
use crate::precision::{EvalConfig, SubtaskWindow, ThresholdSweep};
use crate::sanitize::BlinkRemoval;
use crate::smooth::Smoothing;

/// Opaque bundle handed to the model training service.
pub type Hyperparameters = serde_json::Map<String, serde_json::Value>;

/// Linear threshold sweep as written in the settings file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepSettings {
    pub start: f64,
    pub stop: f64,
    pub count: usize,
}

impl Default for SweepSettings {
    /// 100 thresholds in `[0, 9]` dva.
    fn default() -> Self {
        Self { start: 0.0, stop: 9.0, count: 100 }
    }
}

/// Contents of `settings.json`.
///
/// Missing keys take the defaults below; unknown keys land in
/// [`Settings::hyperparameters`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// BIDS session label, e.g. `ses-02`.
    pub session: String,
    /// Recorded eye label used in physio file names.
    pub eye: String,
    /// Number of runs per subject.
    pub num_run: usize,
    /// Eye-tracker sampling rate in Hz.
    pub eyetrack_sampling: f64,
    /// Screen size in pixels, `[width, height]`.
    pub screen_size: [f64; 2],
    /// Pixels per degree of visual angle.
    pub ppd: f64,
    /// Gaze reference point in pixels.  Defaults to the screen center.
    pub center: Option<[f64; 2]>,
    /// Single precision threshold in dva.
    pub threshold: f64,
    pub threshold_sweep: SweepSettings,
    /// `pupil_off`, `pupil_off_smooth` or empty.
    pub blinks_remove: Option<String>,
    /// Margin excised around each blink, in ms.
    pub blink_margin: f64,
    /// `linear`, `median` or empty.
    pub drift_corr: Option<String>,
    /// `moving_avg`, `gaussian` or empty.
    pub smoothing: Option<String>,
    /// Moving-average window in ms.
    pub window: f64,
    /// Use a trailing (causal) moving-average window instead of a centered one.
    pub causal: bool,
    /// Gaussian sigma in samples.
    pub sigma: f64,
    pub subjects: Vec<String>,
    /// Repetition time in seconds.
    #[serde(rename = "TR")]
    pub tr: f64,
    /// Label points per TR.
    #[serde(rename = "subTRs")]
    pub sub_trs: usize,
    pub first_trial_pattern: String,
    pub last_trial_pattern: String,
    /// Design-matrix column marking fixation periods (drift reference).
    pub fixation_column: Option<String>,
    pub subtask_windows: Vec<SubtaskWindow>,
    /// Observed samples kept before aligning predictions.
    pub eval_samples: Option<usize>,
    /// Reject unknown method names instead of falling back to pass-through.
    pub strict: bool,
    #[serde(flatten)]
    pub hyperparameters: Hyperparameters,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: "ses-01".into(),
            eye: "eye1".into(),
            num_run: 3,
            eyetrack_sampling: 1000.0,
            screen_size: [1920.0, 1080.0],
            ppd: 31.0,
            center: None,
            threshold: 2.0,
            threshold_sweep: SweepSettings::default(),
            blinks_remove: Some("pupil_off_smooth".into()),
            blink_margin: 100.0,
            drift_corr: Some("linear".into()),
            smoothing: Some("moving_avg".into()),
            window: 50.0,
            causal: false,
            sigma: 5.0,
            subjects: vec![],
            tr: 1.2,
            sub_trs: 10,
            first_trial_pattern: "trial 001".into(),
            last_trial_pattern: "trial end".into(),
            fixation_column: None,
            subtask_windows: SubtaskWindow::defaults(),
            eval_samples: Some(184_550),
            strict: true,
            hyperparameters: Hyperparameters::new(),
        }
    }
}

impl Settings {
    /// Read and parse a settings JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()).into());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    /// Resolve method names and validate parameters into a [`PipelineConfig`].
    pub fn resolve(&self) -> Result<PipelineConfig, PipelineError> {
        positive("eyetrack_sampling", self.eyetrack_sampling)?;
        positive("ppd", self.ppd)?;
        positive("TR", self.tr)?;
        if self.sub_trs == 0 {
            return Err(PipelineError::Configuration("subTRs must be at least 1".into()));
        }
        if self.blink_margin < 0.0 || !self.blink_margin.is_finite() {
            return Err(PipelineError::Configuration(format!(
                "blink_margin must be >= 0 ms, got {}", self.blink_margin
            )));
        }

        let blink = resolve_method(
            "blinks_remove", self.blinks_remove.as_deref(), self.strict,
            BlinkRemoval::from_name, BlinkRemoval::None,
        )?;
        let drift = resolve_method(
            "drift_corr", self.drift_corr.as_deref(), self.strict,
            DriftCorrection::from_name, DriftCorrection::None,
        )?;
        let smoothing = resolve_method(
            "smoothing", self.smoothing.as_deref(), self.strict,
            |name| Smoothing::from_name(name, self.window, self.causal, self.sigma),
            Smoothing::None,
        )?;
        match smoothing {
            Smoothing::MovingAverage { window_ms, .. } => positive("window", window_ms)?,
            Smoothing::Gaussian { sigma } => positive("sigma", sigma)?,
            Smoothing::None => {}
        }

        let sweep = ThresholdSweep::linspace(
            self.threshold_sweep.start,
            self.threshold_sweep.stop,
            self.threshold_sweep.count,
        )?;
        SubtaskWindow::validate(&self.subtask_windows)?;

        Ok(PipelineConfig {
            sfreq: self.eyetrack_sampling,
            blink,
            blink_margin_ms: self.blink_margin,
            center: self
                .center
                .unwrap_or([self.screen_size[0] / 2.0, self.screen_size[1] / 2.0]),
            ppd: self.ppd,
            drift,
            smoothing,
            tr: self.tr,
            points_per_tr: self.sub_trs,
            eval: EvalConfig {
                sweep,
                threshold: self.threshold,
                windows: self.subtask_windows.clone(),
                eval_samples: self.eval_samples,
            },
        })
    }
}

/// Resolved, immutable configuration passed to every pipeline stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Eye-tracker sampling rate in Hz.
    pub sfreq: f64,
    pub blink: BlinkRemoval,
    pub blink_margin_ms: f64,
    /// Gaze reference point in pixels, subtracted before the dva conversion.
    pub center: [f64; 2],
    pub ppd: f64,
    pub drift: DriftCorrection,
    pub smoothing: Smoothing,
    /// Label interval (TR) in seconds.
    pub tr: f64,
    /// Label points per interval.
    pub points_per_tr: usize,
    pub eval: EvalConfig,
}

impl Default for PipelineConfig {
    /// The resolved form of [`Settings::default()`].
    fn default() -> Self {
        Self {
            sfreq: 1000.0,
            blink: BlinkRemoval::PupilOffSmooth,
            blink_margin_ms: 100.0,
            center: [960.0, 540.0],
            ppd: 31.0,
            drift: DriftCorrection::Linear,
            smoothing: Smoothing::MovingAverage { window_ms: 50.0, causal: false },
            tr: 1.2,
            points_per_tr: 10,
            eval: EvalConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Label sampling rate in Hz: `points_per_tr / tr`.
    ///
    /// ```
    /// use gazecal::PipelineConfig;
    /// let cfg = PipelineConfig::default();
    /// assert!((cfg.label_rate() - 10.0 / 1.2).abs() < 1e-12);
    /// ```
    pub fn label_rate(&self) -> f64 {
        self.points_per_tr as f64 / self.tr
    }
}

fn positive(name: &str, v: f64) -> Result<(), PipelineError> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::Configuration(format!("{name} must be > 0, got {v}")))
    }
}

/// Map a method name onto its enum.  Empty, absent or `"none"` mean
/// pass-through.  Unknown names fail when `strict`, otherwise they warn and
/// fall back to `fallback`.
fn resolve_method<T>(
    family: &str,
    name: Option<&str>,
    strict: bool,
    parse: impl Fn(&str) -> Option<T>,
    fallback: T,
) -> Result<T, PipelineError> {
    let name = match name.map(str::trim) {
        None | Some("") => return Ok(fallback),
        Some(n) if n.eq_ignore_ascii_case("none") => return Ok(fallback),
        Some(n) => n,
    };
    match parse(name) {
        Some(m) => Ok(m),
        None if strict => Err(PipelineError::Configuration(format!(
            "unknown {family} method '{name}'"
        ))),
        None => {
            warn!(family, method = name, "unknown method, using pass-through");
            Ok(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let cfg = Settings::default().resolve().unwrap();
        assert_eq!(cfg.blink, BlinkRemoval::PupilOffSmooth);
        assert_eq!(cfg.drift, DriftCorrection::Linear);
        assert_eq!(cfg.center, [960.0, 540.0]);
        assert_eq!(cfg.eval.sweep.len(), 100);
    }

    #[test]
    fn unknown_keys_become_hyperparameters() {
        let s: Settings = serde_json::from_str(
            r#"{"num_run": 2, "TR": 1.2, "subTRs": 10, "epochs": 25, "lr": 0.001}"#,
        )
        .unwrap();
        assert_eq!(s.num_run, 2);
        assert_eq!(s.hyperparameters["epochs"], 25);
        assert!(s.hyperparameters.get("num_run").is_none());
    }

    #[test]
    fn strict_rejects_unknown_method() {
        let s = Settings { smoothing: Some("savgol".into()), ..Settings::default() };
        let err = s.resolve().unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn lenient_falls_back_to_pass_through() {
        let s = Settings {
            smoothing: Some("savgol".into()),
            strict: false,
            ..Settings::default()
        };
        assert_eq!(s.resolve().unwrap().smoothing, Smoothing::None);
    }

    #[test]
    fn empty_method_is_pass_through() {
        let s = Settings { blinks_remove: Some(String::new()), ..Settings::default() };
        assert_eq!(s.resolve().unwrap().blink, BlinkRemoval::None);
    }

    #[test]
    fn non_positive_rate_rejected() {
        let s = Settings { eyetrack_sampling: 0.0, ..Settings::default() };
        assert!(s.resolve().is_err());
    }
}
