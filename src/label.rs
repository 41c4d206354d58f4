//! Training-label construction.
//!
//! Each gaze channel is resampled to `points_per_tr / tr` Hz and cut into
//! non-overlapping TR windows, dropping any trailing incomplete window.  The
//! two channels are stacked on the last axis:
//!
//! ```text
//! x: [T]  ┐
//!         ├─→  label [num_TR, points_per_TR, 2]  f32
//! y: [T]  ┘
//! ```
use anyhow::Result;
use ndarray::{s, Array2, Array3};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::resample::resample_to_intervals;

/// Build the `(num_TR, points_per_TR, 2)` label tensor from a cleaned
/// `[2, T]` gaze run.
pub fn training_label(gaze: &Array2<f64>, cfg: &PipelineConfig) -> Result<Array3<f32>> {
    if gaze.nrows() != 2 {
        return Err(PipelineError::Alignment(format!(
            "expected [2, T] gaze, got {:?}",
            gaze.dim()
        ))
        .into());
    }
    let x = resample_to_intervals(&gaze.row(0).to_vec(), cfg.sfreq, cfg.points_per_tr, cfg.tr)?;
    let y = resample_to_intervals(&gaze.row(1).to_vec(), cfg.sfreq, cfg.points_per_tr, cfg.tr)?;
    Ok(stack_channels(&x, &y))
}

/// Stack two `(num_TR, points)` arrays into `(num_TR, points, 2)`.
pub fn stack_channels(x: &Array2<f64>, y: &Array2<f64>) -> Array3<f32> {
    let (n_tr, n_pts) = x.dim();
    let mut out = Array3::<f32>::zeros((n_tr, n_pts, 2));
    out.slice_mut(s![.., .., 0]).assign(&x.mapv(|v| v as f32));
    out.slice_mut(s![.., .., 1]).assign(&y.mapv(|v| v as f32));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_shape() {
        let gaze = Array2::from_elem((2, 12_500), 0.5_f64); // 12.5 s → 10 TRs
        let label = training_label(&gaze, &PipelineConfig::default()).unwrap();
        assert_eq!(label.shape(), &[10, 10, 2]);
    }

    #[test]
    fn channels_land_on_last_axis() {
        let mut gaze = Array2::<f64>::zeros((2, 2_400));
        gaze.row_mut(0).fill(1.0);
        gaze.row_mut(1).fill(-2.0);
        let label = training_label(&gaze, &PipelineConfig::default()).unwrap();
        for tr in 0..label.shape()[0] {
            for p in 0..label.shape()[1] {
                approx::assert_abs_diff_eq!(label[[tr, p, 0]], 1.0, epsilon = 1e-5_f32);
                approx::assert_abs_diff_eq!(label[[tr, p, 1]], -2.0, epsilon = 1e-5_f32);
            }
        }
    }

    #[test]
    fn wrong_channel_count_rejected() {
        let gaze = Array2::<f64>::zeros((3, 2_400));
        assert!(training_label(&gaze, &PipelineConfig::default()).is_err());
    }
}
