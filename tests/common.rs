/// Shared helpers: synthetic recordings and scratch files.
use flate2::write::GzEncoder;
use flate2::Compression;
use gazecal::{Settings, SubtaskWindow};
use ndarray::Array2;
use std::io::Write;
use std::path::Path;

pub const PUPIL_OPEN: f64 = 1000.0;

#[allow(unused)]
/// `[3, n]` run (pupil, x, y) fixating `(cx, cy)` px with a slow x drift of
/// `drift` px per sample.  Samples in each `[start, end)` blink span get
/// pupil 0.
pub fn raw_run(n: usize, center: [f64; 2], drift: f64, blinks: &[(usize, usize)]) -> Array2<f64> {
    let mut raw = Array2::<f64>::zeros((3, n));
    for i in 0..n {
        raw[[0, i]] = PUPIL_OPEN;
        raw[[1, i]] = center[0] + drift * i as f64;
        raw[[2, i]] = center[1];
    }
    for &(s, e) in blinks {
        for i in s..e.min(n) {
            raw[[0, i]] = 0.0;
        }
    }
    raw
}

#[allow(unused)]
pub fn max_abs(x: &[f64]) -> f64 {
    x.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

#[allow(unused)]
/// OLS slope of `y` against its sample index.
pub fn slope(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    let mx = (n - 1.0) / 2.0;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, v) in y.iter().enumerate() {
        let dx = i as f64 - mx;
        sxy += dx * (v - my);
        sxx += dx * dx;
    }
    sxy / sxx
}

#[allow(unused)]
/// Write gzipped tab-separated lines.
pub fn write_tsv_gz(path: &Path, lines: &[String]) {
    let file = std::fs::File::create(path).unwrap();
    let mut enc = GzEncoder::new(file, Compression::default());
    for l in lines {
        writeln!(enc, "{l}").unwrap();
    }
    enc.finish().unwrap();
}

#[allow(unused)]
/// Write one run's physio and event files into `dir`.  The run proper spans
/// timestamps `[lead, lead + raw.ncols())`, with `lead` padding samples on
/// both sides that must be cut away by the trial markers.
pub fn write_recording(dir: &Path, subject: &str, session: &str, task: &str, run: usize, raw: &Array2<f64>, lead: usize) {
    let stem = format!("{subject}_{session}_task-{task}_run-{run:02}_recording-eye1");
    let n = raw.ncols();

    let mut physio = Vec::with_capacity(n + 2 * lead);
    for t in 0..n + 2 * lead {
        let (x, y, pupil) = if t >= lead && t < lead + n {
            let i = t - lead;
            (raw[[1, i]], raw[[2, i]], raw[[0, i]])
        } else {
            (0.0, 0.0, 0.0)
        };
        physio.push(format!("{t}\t{x}\t{y}\t{pupil}"));
    }
    write_tsv_gz(&dir.join(format!("{stem}_physio.tsv.gz")), &physio);

    let events = vec![
        "0\tMSG\tcalibration start".to_string(),
        format!("{lead}\tMSG\ttrial 001 onset"),
        format!("{}\tMSG\ttrial 002 onset", lead + n / 2),
        format!("{}\tMSG\ttrial end", lead + n - 1),
    ];
    write_tsv_gz(&dir.join(format!("{stem}_physioevents.tsv.gz")), &events);
}

#[allow(unused)]
/// Small 100 Hz configuration with short subtask windows.
pub fn small_settings() -> Settings {
    Settings {
        session: "ses-01".into(),
        eye: "eye1".into(),
        num_run: 3,
        eyetrack_sampling: 100.0,
        subjects: vec!["sub-01".into(), "sub-02".into()],
        subtask_windows: vec![
            SubtaskWindow { name: "fixation".into(), start: 0, end: Some(300) },
            SubtaskWindow { name: "pursuit".into(), start: 300, end: Some(600) },
            SubtaskWindow { name: "freeview".into(), start: 600, end: None },
        ],
        eval_samples: None,
        ..Settings::default()
    }
}
