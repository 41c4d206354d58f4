//! Prediction-vs-observation precision scoring.
//!
//! For one run:
//!
//! 1. The observed `[2, T]` gaze is truncated to `eval_samples` (if set).
//! 2. Each predicted channel is interpolated onto the observed sample count
//!    over a normalized `[0, 1]` time axis.
//! 3. The subtask window (a fixed `[start, end)` sample range) is cut from both.
//! 4. Per-sample Euclidean error is computed.
//! 5. The fraction of samples with `error ≤ t` is computed for every
//!    threshold of the sweep, and for the single primary threshold.
use anyhow::Result;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;
use crate::resample::interp_normalized;

/// Ordered, strictly increasing list of distance thresholds (dva).
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSweep {
    thresholds: Vec<f64>,
}

impl ThresholdSweep {
    /// `count` values linearly spaced over `[start, stop]`, both ends included.
    pub fn linspace(start: f64, stop: f64, count: usize) -> Result<Self, PipelineError> {
        if count == 0 || !start.is_finite() || !stop.is_finite() || (count > 1 && stop <= start) {
            return Err(PipelineError::Configuration(format!(
                "invalid threshold sweep: {count} values over [{start}, {stop}]"
            )));
        }
        let thresholds = if count == 1 {
            vec![start]
        } else {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { stop } else { start + i as f64 * step })
                .collect()
        };
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

impl Default for ThresholdSweep {
    /// 100 thresholds over `[0, 9]` dva.
    fn default() -> Self {
        let step = 9.0 / 99.0;
        Self { thresholds: (0..100).map(|i| if i == 99 { 9.0 } else { i as f64 * step }).collect() }
    }
}

/// Named sample-index window of one behavioural subtask, `[start, end)`.
/// `end: None` runs to the end of the signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskWindow {
    pub name: String,
    pub start: usize,
    pub end: Option<usize>,
}

impl SubtaskWindow {
    /// Fixation, pursuit and free-viewing blocks of the calibration run at
    /// 1 kHz.
    pub fn defaults() -> Vec<SubtaskWindow> {
        vec![
            SubtaskWindow { name: "fixation".into(), start: 0, end: Some(71_500) },
            SubtaskWindow { name: "pursuit".into(), start: 71_500, end: Some(145_500) },
            SubtaskWindow { name: "freeview".into(), start: 145_500, end: None },
        ]
    }

    /// Names must be unique, ranges non-empty and non-overlapping.
    pub fn validate(windows: &[SubtaskWindow]) -> Result<(), PipelineError> {
        let mut sorted: Vec<&SubtaskWindow> = windows.iter().collect();
        sorted.sort_by_key(|w| w.start);
        for w in &sorted {
            if matches!(w.end, Some(e) if e <= w.start) {
                return Err(PipelineError::Configuration(format!(
                    "subtask window '{}' is empty", w.name
                )));
            }
            if windows.iter().filter(|o| o.name == w.name).count() > 1 {
                return Err(PipelineError::Configuration(format!(
                    "duplicate subtask window '{}'", w.name
                )));
            }
        }
        for pair in sorted.windows(2) {
            match pair[0].end {
                Some(e) if e <= pair[1].start => {}
                _ => {
                    return Err(PipelineError::Configuration(format!(
                        "subtask windows '{}' and '{}' overlap",
                        pair[0].name, pair[1].name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Clamp the window to a signal of `n` samples.
    pub fn range(&self, n: usize) -> std::ops::Range<usize> {
        let end = self.end.unwrap_or(n).min(n);
        self.start.min(end)..end
    }
}

/// Look up a subtask window by name.  An unknown name yields `None`, which
/// callers treat as "evaluate the whole signal".
pub fn select_window<'a>(windows: &'a [SubtaskWindow], subtask: &str) -> Option<&'a SubtaskWindow> {
    windows.iter().find(|w| w.name == subtask)
}

/// Evaluation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    pub sweep: ThresholdSweep,
    /// Primary threshold in dva.
    pub threshold: f64,
    pub windows: Vec<SubtaskWindow>,
    pub eval_samples: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            sweep: ThresholdSweep::default(),
            threshold: 2.0,
            windows: SubtaskWindow::defaults(),
            eval_samples: Some(184_550),
        }
    }
}

/// Per-sample Euclidean distance between observed `[2, T]` gaze and the
/// predicted channels.
pub fn euclidean_distance(observed: &Array2<f64>, pred_x: &[f64], pred_y: &[f64]) -> Result<Vec<f64>> {
    let n = observed.ncols();
    if observed.nrows() != 2 || pred_x.len() != n || pred_y.len() != n {
        return Err(PipelineError::Alignment(format!(
            "observed {:?} vs predicted x={} y={}",
            observed.dim(),
            pred_x.len(),
            pred_y.len()
        ))
        .into());
    }
    Ok((0..n)
        .map(|i| {
            let dx = observed[[0, i]] - pred_x[i];
            let dy = observed[[1, i]] - pred_y[i];
            dx.hypot(dy)
        })
        .collect())
}

/// Fraction of `errors` that are `≤ threshold`.  Empty input gives 0.
pub fn fraction_under(errors: &[f64], threshold: f64) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().filter(|&&e| e <= threshold).count() as f64 / errors.len() as f64
}

/// [`fraction_under`] for every threshold of the sweep.
///
/// Computed from the sorted errors so the result is monotone by construction.
/// NaN errors are never under a threshold but still count in the denominator.
pub fn sweep_fractions(errors: &[f64], sweep: &ThresholdSweep) -> Vec<f64> {
    if errors.is_empty() {
        return vec![0.0; sweep.len()];
    }
    let mut sorted: Vec<f64> = errors.iter().copied().filter(|e| !e.is_nan()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = errors.len() as f64;
    sweep
        .thresholds()
        .iter()
        .map(|&t| sorted.partition_point(|&e| e <= t) as f64 / n)
        .collect()
}

/// Precision of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPrecision {
    /// Per-sample Euclidean error (dva) inside the evaluated window.
    pub errors: Vec<f64>,
    /// One fraction per sweep threshold.
    pub sweep: Vec<f64>,
    /// Fraction under the primary threshold.
    pub under_threshold: f64,
}

/// Align predictions with observations, cut the subtask window and score.
///
/// `observed` is `[2, T]` (rows: x, y).
pub fn evaluate_run(
    pred_x: &[f64],
    pred_y: &[f64],
    observed: &Array2<f64>,
    subtask: &str,
    cfg: &EvalConfig,
) -> Result<RunPrecision> {
    if pred_x.is_empty() || pred_x.len() != pred_y.len() {
        return Err(PipelineError::Alignment(format!(
            "predicted channels have {} and {} samples",
            pred_x.len(),
            pred_y.len()
        ))
        .into());
    }
    let n_obs = cfg
        .eval_samples
        .map_or(observed.ncols(), |m| m.min(observed.ncols()));
    let observed = observed.slice(s![.., ..n_obs]);

    let aligned_x = interp_normalized(pred_x, n_obs);
    let aligned_y = interp_normalized(pred_y, n_obs);

    let range = match select_window(&cfg.windows, subtask) {
        Some(w) => w.range(n_obs),
        None => {
            warn!(subtask, "unknown subtask, evaluating the full signal");
            0..n_obs
        }
    };
    if range.is_empty() {
        return Err(PipelineError::Alignment(format!(
            "subtask '{subtask}' window is empty for {n_obs} observed samples"
        ))
        .into());
    }

    let window = observed.slice(s![.., range.clone()]).to_owned();
    let errors = euclidean_distance(&window, &aligned_x[range.clone()], &aligned_y[range])?;
    Ok(RunPrecision {
        sweep: sweep_fractions(&errors, &cfg.sweep),
        under_threshold: fraction_under(&errors, cfg.threshold),
        errors,
    })
}
