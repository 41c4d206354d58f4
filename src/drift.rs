//! Drift and baseline correction for a single gaze channel.
//!
//! `Linear` fits `y = slope·i + intercept` by ordinary least squares, either
//! over the whole run or over the reference (fixation) samples only, and
//! subtracts the fitted line from **every** sample of the run.
//!
//! `Median` subtracts the median of the reference samples, or the global
//! median when no reference is given.
use anyhow::Result;

use crate::error::PipelineError;
use crate::resample::resample_to_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftCorrection {
    None,
    Linear,
    Median,
}

impl DriftCorrection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Self::Linear),
            "median" => Some(Self::Median),
            _ => None,
        }
    }
}

/// OLS line through `(x[i], y[i])`.  Returns `(slope, intercept)`.
///
/// A degenerate abscissa (fewer than two distinct x) yields slope 0 and the
/// mean of `y` as intercept.
pub fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n == 0 {
        return (0.0, 0.0);
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut num, mut den) = (0.0, 0.0);
    for i in 0..n {
        let dx = x[i] - mx;
        num += dx * (y[i] - my);
        den += dx * dx;
    }
    let slope = if den > 1e-12 { num / den } else { 0.0 };
    (slope, my - slope * mx)
}

/// Median of `values`, `None` when empty.  Averages the two middle values
/// for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 { 0.5 * (v[mid - 1] + v[mid]) } else { v[mid] })
}

/// Remove a linear trend.  With `reference`, the fit uses only samples where
/// the mask is `true`; fewer than two reference samples fall back to the
/// full run.
pub fn detrend_linear(signal: &[f64], reference: Option<&[bool]>) -> Result<Vec<f64>> {
    let idx: Vec<usize> = match reference {
        Some(mask) => {
            check_mask_len(signal, mask)?;
            let idx: Vec<usize> = (0..signal.len()).filter(|&i| mask[i]).collect();
            if idx.len() < 2 {
                tracing::warn!(
                    reference = idx.len(),
                    "too few reference samples for linear drift fit, using full run"
                );
                (0..signal.len()).collect()
            } else {
                idx
            }
        }
        None => (0..signal.len()).collect(),
    };
    let xs: Vec<f64> = idx.iter().map(|&i| i as f64).collect();
    let ys: Vec<f64> = idx.iter().map(|&i| signal[i]).collect();
    let (slope, intercept) = linear_fit(&xs, &ys);

    Ok(signal
        .iter()
        .enumerate()
        .map(|(i, &v)| v - (slope * i as f64 + intercept))
        .collect())
}

/// Subtract the median of the reference samples (or of the whole signal).
pub fn subtract_median(signal: &[f64], reference: Option<&[bool]>) -> Result<Vec<f64>> {
    let reference_values: Vec<f64> = match reference {
        Some(mask) => {
            check_mask_len(signal, mask)?;
            signal.iter().zip(mask).filter(|(_, m)| **m).map(|(v, _)| *v).collect()
        }
        None => signal.to_vec(),
    };
    let center = match median(&reference_values) {
        Some(m) => m,
        None => median(signal).unwrap_or(0.0),
    };
    Ok(signal.iter().map(|&v| v - center).collect())
}

/// Dispatch on the configured method.
pub fn correct_drift(
    signal: &[f64],
    method: DriftCorrection,
    reference: Option<&[bool]>,
) -> Result<Vec<f64>> {
    match method {
        DriftCorrection::None => Ok(signal.to_vec()),
        DriftCorrection::Linear => detrend_linear(signal, reference),
        DriftCorrection::Median => subtract_median(signal, reference),
    }
}

/// Reference mask from a design-matrix column (one value per design row).
///
/// The column is Fourier-resampled to `n` samples and thresholded at 0.5.
pub fn reference_mask(design_column: &[f64], n: usize) -> Vec<bool> {
    resample_to_len(design_column, n)
        .into_iter()
        .map(|v| v > 0.5)
        .collect()
}

fn check_mask_len(signal: &[f64], mask: &[bool]) -> Result<()> {
    if mask.len() != signal.len() {
        return Err(PipelineError::Alignment(format!(
            "reference mask has {} samples, signal has {}",
            mask.len(),
            signal.len()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_fit_exact_line() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 0.3 * v - 2.0).collect();
        let (m, c) = linear_fit(&x, &y);
        approx::assert_abs_diff_eq!(m, 0.3, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(c, -2.0, epsilon = 1e-10);
    }

    #[test]
    fn detrend_removes_ramp() {
        let y: Vec<f64> = (0..200).map(|i| 0.01 * i as f64 + 4.0).collect();
        let d = detrend_linear(&y, None).unwrap();
        for v in d {
            approx::assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_uses_reference_only() {
        let y = [10.0, 10.0, 1.0, 1.0, 1.0];
        let mask = [true, true, false, false, false];
        let d = subtract_median(&y, Some(&mask)).unwrap();
        assert_eq!(d, vec![0.0, 0.0, -9.0, -9.0, -9.0]);
    }

    #[test]
    fn mask_length_mismatch_is_alignment_error() {
        let err = detrend_linear(&[1.0, 2.0, 3.0], Some(&[true, true])).unwrap_err();
        assert_eq!(crate::error::classify(&err).map(|e| e.kind()), Some("alignment"));
    }

    #[test]
    fn reference_mask_from_block_design() {
        let design = [0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0];
        let mask = reference_mask(&design, 8);
        assert_eq!(mask, vec![false, false, true, true, true, true, false, false]);
    }
}
