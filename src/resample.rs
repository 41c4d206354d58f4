//! Band-limited FFT resampling and normalized-axis interpolation.
//!
//! `resample_to_len` matches `scipy.signal.resample(x, num)`:
//!   1. rfft(x)  →  half-spectrum of `n_in // 2 + 1` bins.
//!   2. Keep the first `min(n_in, n_out) // 2 + 1` bins, zero the rest.
//!   3. If `min(n_in, n_out)` is even, the Nyquist bin of the shorter length
//!      is doubled when downsampling and halved when upsampling.
//!   4. irfft(spectrum, n = n_out) and scale by `n_out / n_in`.
//!
//! The signal is treated as periodic: no edge padding is applied, so the
//! output length is exactly the requested one.
//!
//! `interp_normalized` maps both signals onto `[0, 1]` and interpolates
//! linearly.  It is used to align predictions with observed gaze.
use anyhow::Result;
use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::PipelineError;

/// Resample a 1-D signal to exactly `n_out` samples.
pub fn resample_to_len(x: &[f64], n_out: usize) -> Vec<f64> {
    let n_in = x.len();
    if n_in == 0 || n_out == 0 {
        return vec![0.0; n_out];
    }
    if n_in == n_out {
        return x.to_vec();
    }

    // --- 1. rfft via full complex FFT --------------------------------------
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex { re: v, im: 0.0 }).collect();
    planner.plan_fft_forward(n_in).process(&mut buf);

    // --- 2. Truncate or zero-pad the half-spectrum -------------------------
    let n = n_in.min(n_out);
    let n_keep = n / 2 + 1;
    let out_half = n_out / 2 + 1;
    let mut half = vec![Complex::<f64>::default(); out_half];
    half[..n_keep].copy_from_slice(&buf[..n_keep]);

    // --- 3. Nyquist bin ----------------------------------------------------
    if n % 2 == 0 {
        let nyq = n / 2;
        half[nyq] *= if n_out < n_in { 2.0 } else { 0.5 };
    }

    // --- 4. Hermitian extension + inverse FFT ------------------------------
    let mut full = vec![Complex::<f64>::default(); n_out];
    full[..out_half].copy_from_slice(&half);
    full[0].im = 0.0;
    if n_out % 2 == 0 {
        // irfft ignores the imaginary part of the output Nyquist bin.
        full[n_out / 2].im = 0.0;
    }
    for k in 1..out_half {
        let mirror = n_out - k;
        if mirror >= out_half {
            full[mirror] = full[k].conj();
        }
    }
    planner.plan_fft_inverse(n_out).process(&mut full);

    // irfft normalisation (1/n_out) times the scipy amplitude factor (n_out/n_in).
    let scale = 1.0 / n_in as f64;
    full.iter().map(|c| c.re * scale).collect()
}

/// Sample counts for reshaping a signal into fixed intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalGeometry {
    /// Whole intervals contained in the signal.
    pub num_intervals: usize,
    pub points_per_interval: usize,
    /// Length the signal is resampled to before truncation.
    pub resampled_len: usize,
}

/// Compute the interval geometry for `n` samples at `sfreq`.
///
/// ```text
/// seconds        = n / sfreq
/// num_intervals  = ⌊seconds / interval⌋
/// resampled_len  = max(⌊seconds · points / interval⌋, num_intervals · points)
/// ```
///
/// # Examples
///
/// ```
/// use gazecal::resample::label_geometry;
/// // 185 s at 1 kHz, 10 points per 1.2 s TR
/// let g = label_geometry(185_000, 1000.0, 10, 1.2);
/// assert_eq!(g.num_intervals, 154);
/// assert_eq!(g.resampled_len, 1541);
/// ```
pub fn label_geometry(
    n: usize,
    sfreq: f64,
    points_per_interval: usize,
    interval: f64,
) -> IntervalGeometry {
    let seconds = n as f64 / sfreq;
    let num_intervals = (seconds / interval).floor() as usize;
    let target_rate = points_per_interval as f64 / interval;
    let resampled_len = ((seconds * target_rate).floor() as usize)
        .max(num_intervals * points_per_interval);
    IntervalGeometry { num_intervals, points_per_interval, resampled_len }
}

/// Resample `x` to `points_per_interval / interval` Hz and reshape into
/// `(num_intervals, points_per_interval)`.  A trailing partial interval is
/// discarded.
pub fn resample_to_intervals(
    x: &[f64],
    sfreq: f64,
    points_per_interval: usize,
    interval: f64,
) -> Result<Array2<f64>> {
    let g = label_geometry(x.len(), sfreq, points_per_interval, interval);
    if g.num_intervals == 0 {
        return Err(PipelineError::DataQuality(format!(
            "{} samples at {sfreq} Hz are shorter than one {interval} s interval",
            x.len()
        ))
        .into());
    }
    let resampled = resample_to_len(x, g.resampled_len);
    let keep = g.num_intervals * g.points_per_interval;
    let out = Array2::from_shape_vec(
        (g.num_intervals, g.points_per_interval),
        resampled[..keep].to_vec(),
    )?;
    Ok(out)
}

/// Linearly interpolate `y` onto `n_out` points, both on a `[0, 1]` axis.
///
/// Equivalent to `np.interp(linspace(0, 1, n_out), linspace(0, 1, len(y)), y)`.
/// The first and last values are reproduced exactly.
pub fn interp_normalized(y: &[f64], n_out: usize) -> Vec<f64> {
    let n_in = y.len();
    match (n_in, n_out) {
        (0, _) => return vec![f64::NAN; n_out],
        (_, 0) => return vec![],
        (1, _) => return vec![y[0]; n_out],
        (_, 1) => return vec![y[0]],
        _ => {}
    }
    if n_in == n_out {
        return y.to_vec();
    }
    let step = (n_in - 1) as f64 / (n_out - 1) as f64;
    (0..n_out)
        .map(|i| {
            if i == n_out - 1 {
                return y[n_in - 1];
            }
            let pos = i as f64 * step;
            let lo = (pos.floor() as usize).min(n_in - 2);
            let frac = pos - lo as f64;
            y[lo] + frac * (y[lo + 1] - y[lo])
        })
        .collect()
}
