//! # gazecal — eye-tracking calibration labels and precision scoring
//!
//! `gazecal` prepares eye-tracker recordings for training a gaze-position
//! model from functional imaging (DeepMReye), drives the external training
//! step, and scores the model's predictions against the cleaned recordings.
//!
//! ## Pipeline overview
//!
//! ```text
//! <sub>_<ses>_task-<task>_…_physio.tsv.gz  +  …_physioevents.tsv.gz
//!   │
//!   ├─ events::load_run()        bound by trial-start / trial-end markers → [3, T]
//!   ├─ sanitize::sanitize()      blink excision + NaN interpolation
//!   ├─ sanitize::to_dva()        pixels → degrees around the screen center → [2, T]
//!   ├─ drift::correct_drift()    linear detrend or median re-centering
//!   ├─ smooth::smooth_inplace()  moving average or Gaussian
//!   │
//!   ├─→ label::training_label()  FFT resample + TR reshape → [num_TR, subTR, 2] f32
//!   │       │
//!   │       └─→ model::run_training()  external service → pred_median / pred_subtr
//!   │
//!   └─→ eyedata.tsv.gz ──→ precision::evaluate_run()  interp + window + Euclidean error
//!                              │
//!                              └─→ aggregate::RunTable / GroupSummary
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use gazecal::{preprocess_run, training_label, Settings};
//! use ndarray::Array2;
//!
//! let settings = Settings::default();
//! let cfg = settings.resolve().unwrap();
//!
//! // [3, T] rows: pupil, x, y (pixels), 1 kHz
//! let raw: Array2<f64> = Array2::from_elem((3, 20_000), 500.0);
//!
//! let gaze = preprocess_run(&raw, &cfg, None).unwrap();   // [2, T] dva
//! let label = training_label(&gaze, &cfg).unwrap();       // [16, 10, 2]
//! assert_eq!(label.shape(), &[16, 10, 2]);
//! ```
//!
//! ## Binaries
//!
//! | binary      | does                                                         |
//! |-------------|--------------------------------------------------------------|
//! | `preproc`   | raw recordings → training labels or cleaned eye data         |
//! | `train`     | labels + masked volumes → external model → prediction tables |
//! | `precision` | prediction tables + eye data → per-subject precision tables  |
//! | `group`     | per-subject tables → group tables                            |
//!
//! All binaries read the same `settings.json`; unknown keys are passed through
//! to the model as hyperparameters.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod drift;
pub mod error;
pub mod events;
pub mod io;
pub mod label;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod precision;
pub mod prediction;
pub mod resample;
pub mod sanitize;
pub mod smooth;

use anyhow::Result;
use ndarray::{Array2, ArrayView1};

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{Hyperparameters, PipelineConfig, Settings, SweepSettings};

// error
pub use error::{classify, PipelineError};

// sanitize / drift / smooth
pub use sanitize::{
    detect_blinks, excision_mask, interpolate_nans, margin_samples, remove_blinks, sanitize,
    to_dva, BlinkRemoval, BlinkRun,
};
pub use drift::{correct_drift, reference_mask, DriftCorrection};
pub use smooth::{smooth, smooth_inplace, Smoothing};

// resampling + labels
pub use resample::{interp_normalized, label_geometry, resample_to_intervals, resample_to_len};
pub use label::training_label;

// scoring + tables
pub use precision::{
    evaluate_run, fraction_under, sweep_fractions, EvalConfig, RunPrecision, SubtaskWindow,
    ThresholdSweep,
};
pub use prediction::{flatten_subtr, median_per_tr, Evaluation, SubTrPrediction};
pub use aggregate::{GroupSummary, RunTable, SubjectSummary};

// model service
pub use model::{run_training, CommandService, ModelService, OutputLock, SubjectDataset, TrainingRun};

// io
pub use io::{SafeTensors, TensorWriter, TsvTable};
pub use layout::Layout;

/// Clean one bounded run.
///
/// # Pipeline steps
///
/// 1. Blink removal and NaN interpolation on every channel ([`sanitize()`]).
/// 2. Pixel → dva conversion around [`PipelineConfig::center`].
/// 3. Drift correction of x and y.  With `design_column` given, the fit uses
///    the samples where the resampled column exceeds 0.5.
/// 4. Smoothing of x and y.
///
/// # Arguments
///
/// * `raw` – `[3, T]`, rows pupil, x, y, in pixels.
/// * `cfg` – resolved configuration.
/// * `design_column` – fixation regressor of the run's design matrix, one
///   value per design row.  Resampled to the run length after blink removal.
///
/// # Returns
///
/// `[2, T']` gaze in dva (rows x, y), NaN-free.  `T' == T` unless the
/// [`BlinkRemoval::PupilOff`] policy dropped samples.
///
/// # Errors
///
/// [`PipelineError::DataQuality`] when blink removal leaves nothing to work
/// with.
pub fn preprocess_run(
    raw: &Array2<f64>,
    cfg: &PipelineConfig,
    design_column: Option<&[f64]>,
) -> Result<Array2<f64>> {
    // 1. Blinks.
    let clean = sanitize::sanitize(raw, cfg.blink, cfg.sfreq, cfg.blink_margin_ms)?;

    // 2. Degrees of visual angle.
    let mut gaze = sanitize::to_dva(&clean, cfg.center, cfg.ppd);

    // 3. Drift.
    let reference = design_column.map(|c| drift::reference_mask(c, gaze.ncols()));
    for mut row in gaze.rows_mut() {
        let corrected = drift::correct_drift(&row.to_vec(), cfg.drift, reference.as_deref())?;
        row.assign(&ArrayView1::from(&corrected));
    }

    // 4. Smoothing.
    smooth::smooth_inplace(&mut gaze, cfg.smoothing, cfg.sfreq);

    tracing::debug!(samples = gaze.ncols(), "run preprocessed");
    Ok(gaze)
}
