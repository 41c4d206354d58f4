//! Per-subject and group summary tables.
//!
//! A [`RunTable`] collects one precision vector per completed run and writes
//! them side by side (`run_01`, `run_02`, …) with an element-wise mean column.
//! Runs that failed upstream are simply absent: they get no column and do not
//! enter the mean.
//!
//! A [`GroupSummary`] reads the mean columns back from each subject's tables
//! and lays subjects side by side.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::PipelineError;
use crate::io::TsvTable;
use crate::layout::remove_stale;

/// Mean column of a threshold-sweep table.
pub const SWEEP_MEAN: &str = "precision_mean";
/// Mean column of a single-threshold table.
pub const ONE_THRESHOLD_MEAN: &str = "precision_one_thrs_mean";

/// Column name for a 1-based run index.
pub fn run_column(run: usize) -> String {
    format!("run_{run:02}")
}

/// Per-run result vectors of one subject, keyed by 1-based run index.
#[derive(Debug, Clone)]
pub struct RunTable {
    mean_column: &'static str,
    runs: BTreeMap<usize, Vec<f64>>,
}

impl RunTable {
    pub fn new(mean_column: &'static str) -> Self {
        Self { mean_column, runs: BTreeMap::new() }
    }

    pub fn sweep() -> Self {
        Self::new(SWEEP_MEAN)
    }

    pub fn one_threshold() -> Self {
        Self::new(ONE_THRESHOLD_MEAN)
    }

    /// Record the result of a completed run.  All runs must have the same
    /// length.
    pub fn insert(&mut self, run: usize, values: Vec<f64>) -> Result<()> {
        if let Some(first) = self.runs.values().next() {
            if first.len() != values.len() {
                return Err(PipelineError::Alignment(format!(
                    "run {run} has {} values, other runs have {}",
                    values.len(),
                    first.len()
                ))
                .into());
            }
        }
        self.runs.insert(run, values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> impl Iterator<Item = usize> + '_ {
        self.runs.keys().copied()
    }

    /// Element-wise mean over the recorded runs.  `None` when no run completed.
    pub fn mean(&self) -> Option<Vec<f64>> {
        let n_runs = self.runs.len();
        let first = self.runs.values().next()?;
        let mut acc = vec![0.0; first.len()];
        for values in self.runs.values() {
            for (a, v) in acc.iter_mut().zip(values) {
                *a += v;
            }
        }
        Some(acc.into_iter().map(|a| a / n_runs as f64).collect())
    }

    pub fn to_table(&self) -> TsvTable {
        let mut table = TsvTable::new();
        for (&run, values) in &self.runs {
            table.push_column(run_column(run), values.clone());
        }
        if let Some(mean) = self.mean() {
            table.push_column(self.mean_column, mean);
        }
        table
    }

    /// Write the table.  A table without any completed run is not written,
    /// and a table left by an earlier invocation is removed.
    pub fn write(&self, path: &Path) -> Result<bool> {
        if self.is_empty() {
            warn!(path = %path.display(), "no completed runs, table not written");
            remove_stale(path)?;
            return Ok(false);
        }
        self.to_table().write(path)?;
        Ok(true)
    }
}

/// Mean results of one subject as read back from its summary tables.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSummary {
    pub precision_mean: Vec<f64>,
    pub one_threshold_mean: f64,
}

impl SubjectSummary {
    pub fn read(sweep_path: &Path, one_threshold_path: &Path) -> Result<Self> {
        let sweep = TsvTable::read(sweep_path)?;
        let one = TsvTable::read(one_threshold_path)?;
        let precision_mean = sweep
            .column(SWEEP_MEAN)
            .with_context(|| format!("{} has no {SWEEP_MEAN} column", sweep_path.display()))?
            .to_vec();
        let one_threshold_mean = one
            .column(ONE_THRESHOLD_MEAN)
            .and_then(|c| c.first().copied())
            .with_context(|| {
                format!("{} has no {ONE_THRESHOLD_MEAN} value", one_threshold_path.display())
            })?;
        Ok(Self { precision_mean, one_threshold_mean })
    }
}

/// Subjects side by side, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct GroupSummary {
    subjects: Vec<(String, SubjectSummary)>,
}

impl GroupSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subject: impl Into<String>, summary: SubjectSummary) -> Result<()> {
        let subject = subject.into();
        if let Some((other, first)) = self.subjects.first() {
            if first.precision_mean.len() != summary.precision_mean.len() {
                return Err(PipelineError::Alignment(format!(
                    "{subject} has {} thresholds, {other} has {}",
                    summary.precision_mean.len(),
                    first.precision_mean.len()
                ))
                .into());
            }
        }
        self.subjects.push((subject, summary));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// `threshold` column followed by one column per subject.
    pub fn sweep_table(&self, thresholds: &[f64]) -> Result<TsvTable> {
        let mut table = TsvTable::new();
        table.push_column("threshold", thresholds.to_vec());
        for (subject, s) in &self.subjects {
            table.push_column(subject.clone(), s.precision_mean.clone());
        }
        // ragged columns are caught here rather than on write
        let n = thresholds.len();
        if table.columns.iter().any(|c| c.len() != n) {
            return Err(PipelineError::Alignment(format!(
                "subject tables do not have {n} thresholds"
            ))
            .into());
        }
        Ok(table)
    }

    /// One row, one column per subject.
    pub fn one_threshold_table(&self) -> TsvTable {
        let mut table = TsvTable::new();
        for (subject, s) in &self.subjects {
            table.push_column(subject.clone(), vec![s.one_threshold_mean]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_column_is_zero_padded() {
        assert_eq!(run_column(1), "run_01");
        assert_eq!(run_column(12), "run_12");
    }

    #[test]
    fn mean_skips_missing_runs() {
        let mut t = RunTable::sweep();
        t.insert(1, vec![0.2, 0.4]).unwrap();
        t.insert(3, vec![0.6, 0.8]).unwrap();
        let mean = t.mean().unwrap();
        approx::assert_abs_diff_eq!(mean[0], 0.4, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(mean[1], 0.6, epsilon = 1e-12);

        let table = t.to_table();
        assert_eq!(table.headers, vec!["run_01", "run_03", SWEEP_MEAN]);
    }

    #[test]
    fn empty_table_has_no_mean() {
        assert!(RunTable::one_threshold().mean().is_none());
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut t = RunTable::sweep();
        t.insert(1, vec![0.0; 3]).unwrap();
        assert!(t.insert(2, vec![0.0; 4]).is_err());
    }

    #[test]
    fn group_tables() {
        let mut g = GroupSummary::new();
        g.push("sub-01", SubjectSummary { precision_mean: vec![0.1, 0.9], one_threshold_mean: 0.5 })
            .unwrap();
        g.push("sub-02", SubjectSummary { precision_mean: vec![0.3, 1.0], one_threshold_mean: 0.7 })
            .unwrap();
        let sweep = g.sweep_table(&[0.0, 9.0]).unwrap();
        assert_eq!(sweep.headers, vec!["threshold", "sub-01", "sub-02"]);
        assert_eq!(sweep.column("sub-02"), Some(&[0.3, 1.0][..]));
        let one = g.one_threshold_table();
        assert_eq!(one.column("sub-01"), Some(&[0.5][..]));
    }

    #[test]
    fn empty_table_removes_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.tsv");
        let mut t = RunTable::sweep();
        t.insert(1, vec![0.5]).unwrap();
        assert!(t.write(&path).unwrap());
        assert!(path.exists());

        assert!(!RunTable::sweep().write(&path).unwrap());
        assert!(!path.exists());
    }
}
