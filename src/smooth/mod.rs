//! Noise suppression for gaze channels.
//!
//! - [`kernel`]: boxcar and Gaussian kernel design, window sizing from ms.
//! - [`apply`]: edge-renormalized direct convolution.  Near the signal bounds
//!   only the in-bounds taps contribute and their weights are rescaled to sum
//!   to one, so the window shrinks instead of reading zero padding.

pub mod apply;
pub mod kernel;

pub use apply::{convolve_normalized, smooth_inplace};
pub use kernel::{boxcar, gaussian_kernel, gaussian_kernel_capped, window_samples};

/// Smoothing method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    None,
    /// Boxcar of `window_ms`.  Centered unless `causal`.
    MovingAverage { window_ms: f64, causal: bool },
    /// Gaussian with `sigma` in samples.
    Gaussian { sigma: f64 },
}

impl Smoothing {
    /// `moving_avg` or `gaussian`, parameterised from the settings.
    pub fn from_name(name: &str, window_ms: f64, causal: bool, sigma: f64) -> Option<Self> {
        match name {
            "moving_avg" => Some(Self::MovingAverage { window_ms, causal }),
            "gaussian" => Some(Self::Gaussian { sigma }),
            _ => None,
        }
    }
}

/// Smooth one channel sampled at `sfreq`.  Output length equals input length.
///
/// Kernels are capped to the signal length; windows wider than the signal
/// average over all of it.
pub fn smooth(x: &[f64], method: Smoothing, sfreq: f64) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    match method {
        Smoothing::None => x.to_vec(),
        Smoothing::MovingAverage { window_ms, causal } => {
            let w = window_samples(window_ms, sfreq);
            // Wider windows cover every in-bounds sample already.
            let w = if causal { w.min(n) } else { w.min(2 * n - 1) };
            let anchor = if causal { w - 1 } else { (w - 1) / 2 };
            convolve_normalized(x, &boxcar(w), anchor)
        }
        Smoothing::Gaussian { sigma } => {
            let h = gaussian_kernel_capped(sigma, n - 1);
            convolve_normalized(x, &h, h.len() / 2)
        }
    }
}
