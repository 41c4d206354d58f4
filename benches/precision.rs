use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use gazecal::{evaluate_run, preprocess_run, resample_to_len, EvalConfig, PipelineConfig};
use ndarray::Array2;

const N: usize = 185_000; // one 185 s calibration run at 1 kHz

fn synthetic_raw() -> Array2<f64> {
    Array2::from_shape_fn((3, N), |(r, t)| match r {
        0 => if (t / 4000) % 10 == 9 && t % 4000 < 150 { 0.0 } else { 1000.0 },
        1 => 960.0 + 200.0 * (t as f64 * 1e-3).sin() + 0.001 * t as f64,
        _ => 540.0 + 120.0 * (t as f64 * 7e-4).cos(),
    })
}

fn bench_preprocess_run(c: &mut Criterion) {
    let raw = synthetic_raw();
    let cfg = PipelineConfig::default();
    c.bench_function("preprocess_run [3×185000]", |b| {
        b.iter(|| {
            let gaze = preprocess_run(black_box(&raw), &cfg, None).unwrap();
            black_box(gaze.ncols())
        })
    });
}

fn bench_resample_to_tr(c: &mut Criterion) {
    let x: Vec<f64> = (0..N).map(|t| (t as f64 * 1e-3).sin()).collect();
    c.bench_function("resample_to_len 185000 → 1541", |b| {
        b.iter(|| black_box(resample_to_len(black_box(&x), 1541)).len())
    });
}

fn bench_evaluate_run(c: &mut Criterion) {
    let observed = Array2::from_shape_fn((2, N), |(r, t)| (t as f64 * 1e-3 + r as f64).sin());
    let pred: Vec<f64> = (0..15_410).map(|t| (t as f64 * 0.12).sin()).collect();
    let cfg = EvalConfig::default();
    c.bench_function("evaluate_run pursuit, 100 thresholds", |b| {
        b.iter(|| {
            let run = evaluate_run(&pred, &pred, black_box(&observed), "pursuit", &cfg).unwrap();
            black_box(run.under_threshold)
        })
    });
}

criterion_group!(benches, bench_preprocess_run, bench_resample_to_tr, bench_evaluate_run);
criterion_main!(benches);
