use gazecal::{smooth, smooth_inplace, Smoothing};
use ndarray::Array2;

const METHODS: [Smoothing; 4] = [
    Smoothing::MovingAverage { window_ms: 50.0, causal: false },
    Smoothing::MovingAverage { window_ms: 50.0, causal: true },
    Smoothing::Gaussian { sigma: 5.0 },
    Smoothing::None,
];

#[test]
fn length_is_preserved() {
    let x: Vec<f64> = (0..777).map(|i| (i as f64 * 0.37).sin()).collect();
    for m in METHODS {
        assert_eq!(smooth(&x, m, 1000.0).len(), x.len(), "{m:?}");
    }
}

#[test]
fn constant_stays_constant_up_to_the_edges() {
    let x = vec![2.5; 300];
    for m in METHODS {
        for v in smooth(&x, m, 1000.0) {
            approx::assert_abs_diff_eq!(v, 2.5, epsilon = 1e-12);
        }
    }
}

#[test]
fn moving_average_reduces_noise() {
    let x: Vec<f64> = (0..2000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
    let y = smooth(&x, METHODS[0], 1000.0);
    // interior samples of a 50-sample mean of ±1 alternation
    for v in &y[100..1900] {
        assert!(v.abs() <= 1.0 / 49.0 + 1e-12);
    }
}

#[test]
fn smooth_inplace_handles_every_row() {
    let mut data = Array2::from_shape_fn((2, 400), |(r, t)| r as f64 + (t as f64 * 0.9).cos());
    let before = data.clone();
    smooth_inplace(&mut data, Smoothing::Gaussian { sigma: 3.0 }, 1000.0);
    assert_eq!(data.dim(), before.dim());
    assert_ne!(data.row(0), before.row(0));
    assert_ne!(data.row(1), before.row(1));
}

#[test]
fn very_wide_kernels_average_the_whole_signal() {
    let x: Vec<f64> = (0..200).map(|i| (i as f64 * 0.21).sin() + 0.01 * i as f64).collect();
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    for m in [
        Smoothing::Gaussian { sigma: 1e12 },
        Smoothing::MovingAverage { window_ms: 1e12, causal: false },
    ] {
        for v in smooth(&x, m, 1000.0) {
            approx::assert_abs_diff_eq!(v, mean, epsilon = 1e-9);
        }
    }

    let y = smooth(&x, Smoothing::MovingAverage { window_ms: 1e12, causal: true }, 1000.0);
    approx::assert_abs_diff_eq!(y[0], x[0], epsilon = 1e-12);
    approx::assert_abs_diff_eq!(y[199], mean, epsilon = 1e-9);
}
