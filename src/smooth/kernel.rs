//! Smoothing kernel design.
//!
//! All kernels are normalised to unit sum so a constant signal passes
//! unchanged.
use std::f64::consts::PI;

/// Gaussian tails are cut at this many sigmas.
pub const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Moving-average width in samples for a duration in ms.
///
/// `round(duration_ms / 1000 × sfreq)`, never less than one sample.
pub fn window_samples(duration_ms: f64, sfreq: f64) -> usize {
    ((duration_ms / 1000.0 * sfreq).round() as usize).max(1)
}

/// Flat kernel of length `n` (at least 1).
pub fn boxcar(n: usize) -> Vec<f64> {
    let n = n.max(1);
    vec![1.0 / n as f64; n]
}

/// Normalised Gaussian of standard deviation `sigma` samples.
///
/// Length is `2·⌈4σ⌉ + 1` (always odd, centered on the middle tap).  A
/// non-positive sigma gives the identity kernel `[1.0]`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    gaussian_kernel_capped(sigma, usize::MAX)
}

/// [`gaussian_kernel`] with the radius limited to `max_radius` taps.
///
/// For a signal of `n` samples, taps further than `n − 1` from the center
/// never overlap it, so capping at `n − 1` leaves the edge-renormalized
/// output unchanged while bounding the kernel size for very wide sigmas.
pub fn gaussian_kernel_capped(sigma: f64, max_radius: usize) -> Vec<f64> {
    if sigma.is_nan() || sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = ((GAUSSIAN_TRUNCATE * sigma).ceil() as usize).min(max_radius) as i64;
    let norm = 1.0 / ((2.0 * PI).sqrt() * sigma);
    let mut h: Vec<f64> = (-radius..=radius)
        .map(|i| {
            let x = i as f64 / sigma;
            norm * (-0.5 * x * x).exp()
        })
        .collect();
    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);
    h
}
