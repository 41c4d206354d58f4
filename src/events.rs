//! Eye-tracker recordings and run bounding.
//!
//! Each run comes as two headerless tab-separated files (optionally gzipped):
//!
//! ```text
//! <sub>_<ses>_task-<task>_..._physio.tsv.gz        timestamp  x  y  pupil
//! <sub>_<ses>_task-<task>_..._physioevents.tsv.gz  timestamp  ...  message
//! ```
//!
//! The run is bounded by the first event whose message contains the
//! trial-start pattern and the last event whose message contains the
//! trial-end pattern.  Samples with timestamps inside `[start, end]` are kept
//! and returned as `[3, T]` (rows: pupil, x, y).
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::io::{parse_number, read_records};
use crate::sanitize::{PUPIL, X, Y};

/// Which of the two per-run files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    Samples,
    Events,
}

impl RecordingKind {
    fn suffixes(self) -> [&'static str; 2] {
        match self {
            RecordingKind::Samples => ["_physio.tsv", "_physio.tsv.gz"],
            RecordingKind::Events => ["_physioevents.tsv", "_physioevents.tsv.gz"],
        }
    }
}

/// File-name prefix shared by all recordings of one subject/session/task.
pub fn recording_prefix(subject: &str, session: &str, task: &str) -> String {
    format!("{subject}_{session}_task-{task}_")
}

/// Sorted paths in `dir` matching `prefix`, the kind's suffix and, when
/// non-empty, containing `eye`.
pub fn discover(dir: &Path, prefix: &str, eye: &str, kind: RecordingKind) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::MissingInput(dir.to_path_buf()).into());
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix)
            && kind.suffixes().iter().any(|s| name.ends_with(s))
            && (eye.is_empty() || name.contains(eye))
        {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// The pair of files making up one run.  `run` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    pub run: usize,
    pub samples: PathBuf,
    pub events: PathBuf,
}

/// Pair sample and event files by sorted position.
pub fn discover_runs(
    dir: &Path,
    subject: &str,
    session: &str,
    task: &str,
    eye: &str,
) -> Result<Vec<RunFiles>> {
    let prefix = recording_prefix(subject, session, task);
    let samples = discover(dir, &prefix, eye, RecordingKind::Samples)?;
    let events = discover(dir, &prefix, eye, RecordingKind::Events)?;
    if samples.is_empty() {
        return Err(PipelineError::MissingInput(dir.join(format!("{prefix}*_physio.tsv.gz"))).into());
    }
    if samples.len() != events.len() {
        warn!(
            subject,
            samples = samples.len(),
            events = events.len(),
            "sample and event file counts differ, pairing by position"
        );
    }
    Ok(samples
        .into_iter()
        .zip(events)
        .enumerate()
        .map(|(i, (samples, events))| RunFiles { run: i + 1, samples, events })
        .collect())
}

/// Timestamped event messages of one run.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub times: Vec<f64>,
    pub messages: Vec<String>,
}

impl EventLog {
    /// First column is the timestamp, last column the message.  Rows with
    /// fewer than two columns are skipped.
    pub fn read(path: &Path) -> Result<Self> {
        let mut log = EventLog::default();
        for rec in read_records(path, false)? {
            if rec.len() < 2 {
                continue;
            }
            let t = parse_number(&rec[0])?;
            if !t.is_finite() {
                continue;
            }
            log.times.push(t);
            log.messages.push(rec[rec.len() - 1].to_string());
        }
        Ok(log)
    }

    fn matching(&self, pattern: &str) -> impl Iterator<Item = f64> + '_ {
        let pattern = pattern.to_string();
        self.times
            .iter()
            .zip(&self.messages)
            .filter(move |(_, m)| m.contains(&pattern))
            .map(|(&t, _)| t)
    }

    /// `[start, end]` of the run.  Fails with [`PipelineError::DataQuality`]
    /// when either marker is absent or the end precedes the start.
    pub fn run_bounds(&self, first_pattern: &str, last_pattern: &str) -> Result<(f64, f64)> {
        let start = self.matching(first_pattern).next().ok_or_else(|| {
            PipelineError::DataQuality(format!("no '{first_pattern}' marker in event log"))
        })?;
        let end = self.matching(last_pattern).last().ok_or_else(|| {
            PipelineError::DataQuality(format!("no '{last_pattern}' marker in event log"))
        })?;
        if end < start {
            return Err(PipelineError::DataQuality(format!(
                "trial end {end} precedes trial start {start}"
            ))
            .into());
        }
        Ok((start, end))
    }
}

/// Raw gaze samples of one run.
#[derive(Debug, Clone)]
pub struct PhysioRecording {
    pub timestamps: Vec<f64>,
    /// `[3, T]` rows: pupil, x, y.
    pub data: Array2<f64>,
}

impl PhysioRecording {
    pub fn read(path: &Path) -> Result<Self> {
        let records = read_records(path, false)?;
        let mut timestamps = Vec::with_capacity(records.len());
        let mut cols: [Vec<f64>; 3] = Default::default();
        for (line, rec) in records.iter().enumerate() {
            if rec.len() < 4 {
                return Err(PipelineError::Alignment(format!(
                    "{} line {}: expected 4 columns, found {}",
                    path.display(),
                    line + 1,
                    rec.len()
                ))
                .into());
            }
            timestamps.push(parse_number(&rec[0])?);
            cols[X].push(parse_number(&rec[1])?);
            cols[Y].push(parse_number(&rec[2])?);
            cols[PUPIL].push(parse_number(&rec[3])?);
        }
        let n = timestamps.len();
        let flat: Vec<f64> = cols.into_iter().flatten().collect();
        Ok(Self { timestamps, data: Array2::from_shape_vec((3, n), flat)? })
    }

    /// Samples with `start <= t <= end`.
    pub fn bounded(&self, start: f64, end: f64) -> Result<Array2<f64>> {
        let keep: Vec<usize> = (0..self.timestamps.len())
            .filter(|&i| self.timestamps[i] >= start && self.timestamps[i] <= end)
            .collect();
        if keep.is_empty() {
            return Err(PipelineError::DataQuality(format!(
                "no samples between {start} and {end}"
            ))
            .into());
        }
        Ok(self.data.select(ndarray::Axis(1), &keep))
    }
}

/// Read one run and bound it by the trial markers.
pub fn load_run(files: &RunFiles, first_pattern: &str, last_pattern: &str) -> Result<Array2<f64>> {
    let events = EventLog::read(&files.events)?;
    let (start, end) = events.run_bounds(first_pattern, last_pattern)?;
    let data = PhysioRecording::read(&files.samples)?.bounded(start, end)?;
    debug!(run = files.run, start, end, samples = data.ncols(), "run bounded");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(rows: &[(f64, &str)]) -> EventLog {
        EventLog {
            times: rows.iter().map(|r| r.0).collect(),
            messages: rows.iter().map(|r| r.1.to_string()).collect(),
        }
    }

    #[test]
    fn bounds_use_first_start_and_last_end() {
        let ev = log(&[
            (5.0, "calibration"),
            (10.0, "trial 001 onset"),
            (20.0, "trial 001 onset"),
            (50.0, "trial end"),
            (60.0, "trial end"),
        ]);
        assert_eq!(ev.run_bounds("trial 001", "trial end").unwrap(), (10.0, 60.0));
    }

    #[test]
    fn missing_marker_is_data_quality() {
        let ev = log(&[(10.0, "trial 001")]);
        let err = ev.run_bounds("trial 001", "trial end").unwrap_err();
        assert_eq!(crate::error::classify(&err).map(|e| e.kind()), Some("data_quality"));
    }

    #[test]
    fn bounded_is_inclusive() {
        let rec = PhysioRecording {
            timestamps: vec![0.0, 1.0, 2.0, 3.0],
            data: Array2::from_shape_fn((3, 4), |(r, c)| (r * 10 + c) as f64),
        };
        let b = rec.bounded(1.0, 2.0).unwrap();
        assert_eq!(b.ncols(), 2);
        assert_eq!(b[[0, 0]], 1.0);
        assert!(rec.bounded(5.0, 6.0).is_err());
    }

    #[test]
    fn prefix_format() {
        assert_eq!(
            recording_prefix("sub-01", "ses-02", "DeepMReyeCalib"),
            "sub-01_ses-02_task-DeepMReyeCalib_"
        );
    }
}
