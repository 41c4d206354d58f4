mod common;
use common::slope;
use gazecal::{correct_drift, reference_mask, DriftCorrection};

#[test]
fn linear_detrend_leaves_no_slope() {
    let x: Vec<f64> = (0..5000)
        .map(|i| 3.0 + 0.002 * i as f64 + (i as f64 * 0.01).sin())
        .collect();
    let y = correct_drift(&x, DriftCorrection::Linear, None).unwrap();
    assert_eq!(y.len(), x.len());
    approx::assert_abs_diff_eq!(slope(&y), 0.0, epsilon = 1e-9);
}

#[test]
fn reference_fit_is_extrapolated_over_the_run() {
    // Linear on the reference (first half), step afterwards.
    let n = 1000;
    let x: Vec<f64> = (0..n)
        .map(|i| 0.01 * i as f64 + if i >= n / 2 { 5.0 } else { 0.0 })
        .collect();
    let mask: Vec<bool> = (0..n).map(|i| i < n / 2).collect();
    let y = correct_drift(&x, DriftCorrection::Linear, Some(&mask)).unwrap();
    for v in &y[..n / 2] {
        approx::assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-9);
    }
    for v in &y[n / 2..] {
        approx::assert_abs_diff_eq!(*v, 5.0, epsilon = 1e-9);
    }
}

#[test]
fn median_recentering_uses_reference() {
    let x = vec![1.0, 2.0, 3.0, 100.0, 200.0];
    let mask = vec![true, true, true, false, false];
    let y = correct_drift(&x, DriftCorrection::Median, Some(&mask)).unwrap();
    assert_eq!(y, vec![-1.0, 0.0, 1.0, 98.0, 198.0]);

    let y = correct_drift(&x, DriftCorrection::Median, None).unwrap();
    assert_eq!(y[2], 0.0);
}

#[test]
fn design_column_becomes_mask_of_run_length() {
    // 10 design rows, fixation on the first half.
    let design = [1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let mask = reference_mask(&design, 10);
    assert_eq!(mask, design.iter().map(|&v| v > 0.5).collect::<Vec<_>>());
    assert_eq!(reference_mask(&design, 1200).len(), 1200);
}

#[test]
fn mask_length_mismatch_is_alignment_error() {
    let err = correct_drift(&[0.0; 10], DriftCorrection::Linear, Some(&[true; 9])).unwrap_err();
    assert_eq!(gazecal::classify(&err).map(|e| e.kind()), Some("alignment"));
}
