//! Edge-renormalized direct convolution.
//!
//! ```text
//! y[i] = Σ_k h[k]·x[i + k − anchor]  /  Σ_k h[k]      (in-bounds k only)
//! ```
//!
//! `anchor` is the kernel tap aligned with the output sample: the middle tap
//! for a centered window, the last tap for a trailing (causal) one.
use ndarray::Array2;

use super::{smooth, Smoothing};

/// Convolve `x` with `h`, renormalising by the in-bounds kernel mass.
///
/// Returns a vector of the same length as `x`.
pub fn convolve_normalized(x: &[f64], h: &[f64], anchor: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 || h.is_empty() {
        return x.to_vec();
    }
    let anchor = anchor.min(h.len() - 1);

    (0..n)
        .map(|i| {
            // Tap k reads x[i + k - anchor]; keep 0 <= i + k - anchor < n.
            let k_lo = anchor.saturating_sub(i);
            let k_hi = (n - i + anchor).min(h.len());
            let (mut acc, mut mass) = (0.0, 0.0);
            for (k, &w) in h.iter().enumerate().take(k_hi).skip(k_lo) {
                acc += w * x[i + k - anchor];
                mass += w;
            }
            if mass > 0.0 { acc / mass } else { x[i] }
        })
        .collect()
}

/// Smooth every row of `data` ([C, T]) in place.
pub fn smooth_inplace(data: &mut Array2<f64>, method: Smoothing, sfreq: f64) {
    if method == Smoothing::None {
        return;
    }
    for mut row in data.rows_mut() {
        let smoothed = smooth(&row.to_vec(), method, sfreq);
        row.assign(&ndarray::ArrayView1::from(&smoothed));
    }
}
