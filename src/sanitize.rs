//! Blink excision and gap filling.
//!
//! Input is one bounded run as `[3, T]` (rows: pupil, x, y).  A sample is
//! pupil-off when the pupil channel equals [`PUPIL_OFF`] or is not finite.
//! Every maximal pupil-off span is widened by a fixed margin on both sides to
//! cover the eyelid transients, and the widened span is excised as a whole.
//!
//! ```text
//! pupil   ▇▇▇▇▇▇▇▁▁▁▁▁▇▇▇▇▇▇▇
//! blink          [~~~~)
//! excised     [~~~~~~~~~~)        margin on both sides
//! ```
//!
//! [`BlinkRemoval::PupilOff`] drops the excised samples.
//! [`BlinkRemoval::PupilOffSmooth`] marks them NaN on every channel, fills them
//! by linear interpolation and then runs a short moving average across the
//! seams of each filled span.
use anyhow::Result;
use ndarray::{Array2, Axis};

use crate::error::PipelineError;
use crate::smooth::apply::convolve_normalized;
use crate::smooth::kernel::boxcar;

/// Pupil value written by the tracker while the pupil is lost.
pub const PUPIL_OFF: f64 = 0.0;

/// Row indices in a raw `[3, T]` run.
pub const PUPIL: usize = 0;
pub const X: usize = 1;
pub const Y: usize = 2;

/// Blink removal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkRemoval {
    None,
    /// Drop excised samples.
    PupilOff,
    /// NaN-fill excised samples, interpolate, smooth the seams.
    PupilOffSmooth,
}

impl BlinkRemoval {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pupil_off" => Some(Self::PupilOff),
            "pupil_off_smooth" => Some(Self::PupilOffSmooth),
            _ => None,
        }
    }
}

/// Maximal pupil-off span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkRun {
    pub start: usize,
    pub end: usize,
}

impl BlinkRun {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[inline]
fn pupil_off(v: f64) -> bool {
    !v.is_finite() || v == PUPIL_OFF
}

/// Find every maximal pupil-off span.
pub fn detect_blinks(pupil: &[f64]) -> Vec<BlinkRun> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &v) in pupil.iter().enumerate() {
        match (pupil_off(v), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(BlinkRun { start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(BlinkRun { start: s, end: pupil.len() });
    }
    runs
}

/// Margin in samples for a duration in ms: `round(margin_ms / 1000 × sfreq)`.
pub fn margin_samples(sfreq: f64, margin_ms: f64) -> usize {
    (margin_ms / 1000.0 * sfreq).round().max(0.0) as usize
}

/// Boolean mask of samples to excise: each blink widened by `margin` on both
/// sides, clamped to `[0, n)`.
pub fn excision_mask(n: usize, blinks: &[BlinkRun], margin: usize) -> Vec<bool> {
    let mut mask = vec![false; n];
    for b in blinks {
        let lo = b.start.saturating_sub(margin);
        let hi = (b.end + margin).min(n);
        mask[lo..hi].iter_mut().for_each(|m| *m = true);
    }
    mask
}

/// Apply the blink policy to a raw `[3, T]` run.
///
/// Returns the processed run and the excision mask (all `false` for
/// [`BlinkRemoval::None`]).  For [`BlinkRemoval::PupilOff`] the returned run is
/// shorter than the input; the mask still refers to input indices.
pub fn remove_blinks(
    data: &Array2<f64>,
    method: BlinkRemoval,
    sfreq: f64,
    margin_ms: f64,
) -> Result<(Array2<f64>, Vec<bool>)> {
    let n = data.ncols();
    if method == BlinkRemoval::None {
        return Ok((data.clone(), vec![false; n]));
    }

    let pupil = data.row(PUPIL).to_vec();
    let blinks = detect_blinks(&pupil);
    let mask = excision_mask(n, &blinks, margin_samples(sfreq, margin_ms));
    let n_excised = mask.iter().filter(|&&m| m).count();
    if n > 0 && n_excised == n {
        return Err(PipelineError::DataQuality(format!(
            "all {n} samples excised by blink removal"
        ))
        .into());
    }
    tracing::debug!(blinks = blinks.len(), excised = n_excised, n, "blink excision");

    let out = match method {
        BlinkRemoval::PupilOff => {
            let keep: Vec<usize> = (0..n).filter(|&i| !mask[i]).collect();
            data.select(Axis(1), &keep)
        }
        BlinkRemoval::PupilOffSmooth => {
            let mut out = data.clone();
            for (mut col, &m) in out.columns_mut().into_iter().zip(&mask) {
                if m {
                    col.fill(f64::NAN);
                }
            }
            out
        }
        BlinkRemoval::None => unreachable!(),
    };
    Ok((out, mask))
}

/// Fill NaNs by linear interpolation between the nearest valid neighbours.
///
/// Leading and trailing NaN runs take the nearest valid value.  Fails with
/// [`PipelineError::DataQuality`] when no sample is valid.
pub fn interpolate_nans(x: &[f64]) -> Result<Vec<f64>> {
    let valid: Vec<usize> = (0..x.len()).filter(|&i| x[i].is_finite()).collect();
    let (first, last) = match (valid.first(), valid.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => {
            return Err(PipelineError::DataQuality(format!(
                "no valid samples to interpolate from ({} samples)", x.len()
            ))
            .into())
        }
    };

    let mut out = x.to_vec();
    out[..first].iter_mut().for_each(|v| *v = x[first]);
    out[last + 1..].iter_mut().for_each(|v| *v = x[last]);
    for pair in valid.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a < 2 {
            continue;
        }
        let (ya, yb) = (x[a], x[b]);
        let span = (b - a) as f64;
        for (k, v) in out[a + 1..b].iter_mut().enumerate() {
            let t = (k + 1) as f64 / span;
            *v = ya + t * (yb - ya);
        }
    }
    Ok(out)
}

/// Moving average applied only within `half_width` samples of each seam of
/// the excised spans in `mask`.  Samples away from a seam are untouched.
pub fn smooth_blink_edges(x: &[f64], mask: &[bool], half_width: usize) -> Vec<f64> {
    let n = x.len();
    if half_width == 0 || n == 0 {
        return x.to_vec();
    }
    let mut near_seam = vec![false; n];
    for i in 1..n {
        if mask[i] != mask[i - 1] {
            let lo = i.saturating_sub(half_width);
            let hi = (i + half_width).min(n);
            near_seam[lo..hi].iter_mut().for_each(|s| *s = true);
        }
    }
    if !near_seam.contains(&true) {
        return x.to_vec();
    }
    let h = boxcar(2 * half_width + 1);
    let smoothed = convolve_normalized(x, &h, half_width);
    x.iter()
        .zip(smoothed)
        .zip(&near_seam)
        .map(|((&orig, s), &seam)| if seam { s } else { orig })
        .collect()
}

/// Blink removal followed by gap filling on every channel.
///
/// The result contains no NaNs.  Running it again on its own output is a
/// no-op, since no pupil-off samples remain.
pub fn sanitize(
    data: &Array2<f64>,
    method: BlinkRemoval,
    sfreq: f64,
    margin_ms: f64,
) -> Result<Array2<f64>> {
    let (mut out, mask) = remove_blinks(data, method, sfreq, margin_ms)?;
    let edge_width = (margin_samples(sfreq, margin_ms) / 2).max(1);

    for mut row in out.rows_mut() {
        let filled = interpolate_nans(&row.to_vec())?;
        let filled = if method == BlinkRemoval::PupilOffSmooth {
            smooth_blink_edges(&filled, &mask, edge_width)
        } else {
            filled
        };
        row.assign(&ndarray::ArrayView1::from(&filled));
    }
    Ok(out)
}

/// Convert the x/y rows of a raw `[3, T]` run from pixels to degrees of
/// visual angle around `center`, returning `[2, T]` (rows: x, y).
pub fn to_dva(data: &Array2<f64>, center: [f64; 2], ppd: f64) -> Array2<f64> {
    let mut gaze = Array2::<f64>::zeros((2, data.ncols()));
    for (axis, row) in [X, Y].into_iter().enumerate() {
        gaze.row_mut(axis)
            .assign(&data.row(row).mapv(|v| (v - center[axis]) / ppd));
    }
    gaze
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_blinks_finds_interior_and_trailing_runs() {
        let pupil = [5.0, 0.0, 0.0, 5.0, 5.0, f64::NAN, 0.0];
        let runs = detect_blinks(&pupil);
        assert_eq!(runs, vec![BlinkRun { start: 1, end: 3 }, BlinkRun { start: 5, end: 7 }]);
    }

    #[test]
    fn margin_from_rate() {
        assert_eq!(margin_samples(1000.0, 100.0), 100);
        assert_eq!(margin_samples(500.0, 100.0), 50);
    }

    #[test]
    fn mask_is_clamped() {
        let mask = excision_mask(10, &[BlinkRun { start: 1, end: 2 }], 3);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 5); // 0..5
        assert!(mask[4] && !mask[5]);
    }

    #[test]
    fn interpolate_linear_and_edges() {
        let x = [f64::NAN, 1.0, f64::NAN, f64::NAN, 4.0, f64::NAN];
        let y = interpolate_nans(&x).unwrap();
        let expected = [1.0, 1.0, 2.0, 3.0, 4.0, 4.0];
        for (a, b) in y.iter().zip(expected) {
            approx::assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn interpolate_all_nan_fails() {
        let err = interpolate_nans(&[f64::NAN; 4]).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(PipelineError::DataQuality(_))
        ));
    }

    #[test]
    fn seam_smoothing_leaves_far_samples() {
        let x: Vec<f64> = (0..40).map(|i| if i < 20 { 0.0 } else { 10.0 }).collect();
        let mut mask = vec![false; 40];
        mask[20..25].iter_mut().for_each(|m| *m = true);
        let y = smooth_blink_edges(&x, &mask, 2);
        assert_eq!(y[0], 0.0);
        assert_eq!(y[39], 10.0);
        assert!(y[20] > 0.0 && y[20] < 10.0);
    }

    #[test]
    fn to_dva_centers_and_scales() {
        let data = ndarray::array![[1.0, 1.0], [960.0, 1022.0], [540.0, 509.0]];
        let gaze = to_dva(&data, [960.0, 540.0], 31.0);
        assert_eq!(gaze.dim(), (2, 2));
        approx::assert_abs_diff_eq!(gaze[[0, 1]], 2.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(gaze[[1, 1]], -1.0, epsilon = 1e-12);
    }
}
