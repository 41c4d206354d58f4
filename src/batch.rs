//! Per-subject drivers used by the binaries.
//!
//! Runs are independent and processed with a rayon parallel iterator.  A run
//! that fails with a data-quality, alignment or missing-input error is logged
//! and left out; the subject continues with its remaining runs.  A
//! configuration error stops the whole invocation.
use std::path::{Path, PathBuf};

use anyhow::Result;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::aggregate::{GroupSummary, RunTable, SubjectSummary};
use crate::config::{PipelineConfig, Settings};
use crate::error::{classify, PipelineError};
use crate::events::{discover_runs, load_run};
use crate::io::{write_label, TsvTable};
use crate::label::training_label;
use crate::layout::{ensure_parent, remove_stale, Layout};
use crate::precision::evaluate_run;
use crate::prediction::SubTrPrediction;
use crate::preprocess_run;

/// What the preprocessing pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `(num_TR, points_per_TR, 2)` training label tensors.
    Labels,
    /// Cleaned `x, y` timeseries.
    Eyetracking,
}

/// Keep completed runs, log skipped ones.  Configuration errors are returned.
pub fn collect_runs<T>(subject: &str, results: Vec<(usize, Result<T>)>) -> Result<Vec<(usize, T)>> {
    let mut done = Vec::with_capacity(results.len());
    for (run, res) in results {
        match res {
            Ok(v) => done.push((run, v)),
            Err(e) => match classify(&e) {
                Some(PipelineError::Configuration(_)) => return Err(e),
                class => {
                    let kind = class.map_or("other", PipelineError::kind);
                    warn!(subject, run, kind, error = %format!("{e:#}"), "run skipped");
                }
            },
        }
    }
    done.sort_by_key(|(run, _)| *run);
    Ok(done)
}

/// Shared context of one invocation.
pub struct Batch<'a> {
    pub layout: &'a Layout,
    pub settings: &'a Settings,
    pub cfg: &'a PipelineConfig,
}

impl<'a> Batch<'a> {
    pub fn new(layout: &'a Layout, settings: &'a Settings, cfg: &'a PipelineConfig) -> Self {
        Self { layout, settings, cfg }
    }

    fn design_column(&self, subject: &str, run: usize) -> Result<Option<Vec<f64>>> {
        let Some(name) = self.settings.fixation_column.as_deref() else {
            return Ok(None);
        };
        let path = self.layout.design_matrix(subject, &self.settings.session, run);
        let table = TsvTable::read(&path)?;
        let column = table.column(name).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "design matrix {} has no '{name}' column",
                path.display()
            ))
        })?;
        Ok(Some(column.to_vec()))
    }

    /// Preprocess every run of `subject` found in `raw_dir` and write one
    /// output per completed run.  Returns the completed run numbers.
    pub fn preprocess_subject(&self, raw_dir: &Path, subject: &str, kind: OutputKind) -> Result<Vec<usize>> {
        let s = self.settings;
        for run in 1..=s.num_run {
            remove_stale(&self.output_path(subject, run, kind))?;
        }
        let mut files = discover_runs(raw_dir, subject, &s.session, self.layout.task(), &s.eye)?;
        if files.len() > s.num_run {
            warn!(subject, found = files.len(), expected = s.num_run, "extra recordings ignored");
            files.truncate(s.num_run);
        }

        let results: Vec<(usize, Result<()>)> = files
            .par_iter()
            .map(|f| {
                let res = (|| -> Result<()> {
                    let raw = load_run(f, &s.first_trial_pattern, &s.last_trial_pattern)?;
                    let design = self.design_column(subject, f.run)?;
                    let gaze = preprocess_run(&raw, self.cfg, design.as_deref())?;
                    self.write_output(subject, f.run, &gaze, kind)
                })();
                (f.run, res)
            })
            .collect();

        let done: Vec<usize> = collect_runs(subject, results)?.into_iter().map(|(r, _)| r).collect();
        info!(subject, runs = ?done, "preprocessing finished");
        Ok(done)
    }

    fn output_path(&self, subject: &str, run: usize, kind: OutputKind) -> PathBuf {
        match kind {
            OutputKind::Labels => self.layout.label(subject, run),
            OutputKind::Eyetracking => self.layout.eyedata(subject, run),
        }
    }

    fn write_output(&self, subject: &str, run: usize, gaze: &Array2<f64>, kind: OutputKind) -> Result<()> {
        let path = self.output_path(subject, run, kind);
        match kind {
            OutputKind::Labels => {
                let label = training_label(gaze, self.cfg)?;
                ensure_parent(&path)?;
                write_label(&path, &label)?;
                info!(subject, run, shape = ?label.shape(), "label written");
            }
            OutputKind::Eyetracking => {
                let mut table = TsvTable::new();
                table.push_column("x", gaze.row(0).to_vec());
                table.push_column("y", gaze.row(1).to_vec());
                ensure_parent(&path)?;
                table.write(&path)?;
                info!(subject, run, samples = gaze.ncols(), "eye data written");
            }
        }
        Ok(())
    }

    /// Score the predictions of `subject` against its cleaned eye data for
    /// one subtask and write per-run errors and the two summary tables.
    ///
    /// Returns `(sweep, one_threshold)` tables holding completed runs only.
    /// Outputs of an earlier invocation are removed first, so a subject or run
    /// that fails this time leaves nothing behind for [`Batch::group_summary`].
    pub fn evaluate_subject(&self, subject: &str, subtask: &str) -> Result<(RunTable, RunTable)> {
        remove_stale(&self.layout.precision_summary(subject, subtask))?;
        remove_stale(&self.layout.one_threshold_summary(subject, subtask))?;
        for run in 1..=self.settings.num_run {
            remove_stale(&self.layout.euclidean_error(subject, subtask, run))?;
        }

        let pred = SubTrPrediction::from_table(&TsvTable::read(&self.layout.pred_subtr(subject))?)?;
        let segments = pred.split_runs(self.settings.num_run)?;

        let results: Vec<(usize, Result<(Vec<f64>, f64)>)> = segments
            .par_iter()
            .enumerate()
            .map(|(i, seg)| {
                let run = i + 1;
                (run, self.evaluate_one(subject, subtask, run, seg))
            })
            .collect();

        let mut sweep = RunTable::sweep();
        let mut one = RunTable::one_threshold();
        for (run, (fractions, under)) in collect_runs(subject, results)? {
            sweep.insert(run, fractions)?;
            one.insert(run, vec![under])?;
        }

        let sweep_path = self.layout.precision_summary(subject, subtask);
        ensure_parent(&sweep_path)?;
        sweep.write(&sweep_path)?;
        one.write(&self.layout.one_threshold_summary(subject, subtask))?;
        info!(subject, subtask, runs = sweep.len(), "precision written");
        Ok((sweep, one))
    }

    fn evaluate_one(
        &self,
        subject: &str,
        subtask: &str,
        run: usize,
        seg: &SubTrPrediction,
    ) -> Result<(Vec<f64>, f64)> {
        let table = TsvTable::read(&self.layout.eyedata(subject, run))?;
        let observed = observed_gaze(&table)?;
        let precision = evaluate_run(&seg.x, &seg.y, &observed, subtask, &self.cfg.eval)?;

        let mut ee = TsvTable::new();
        ee.push_column("ee", precision.errors);
        ee.write(&self.layout.euclidean_error(subject, subtask, run))?;
        Ok((precision.sweep, precision.under_threshold))
    }

    /// Read every subject's summary tables and write the group tables.
    /// Subjects without tables are left out.
    pub fn group_summary(&self, subjects: &[String], subtask: &str) -> Result<GroupSummary> {
        let mut group = GroupSummary::new();
        for subject in subjects {
            let read = SubjectSummary::read(
                &self.layout.precision_summary(subject, subtask),
                &self.layout.one_threshold_summary(subject, subtask),
            );
            match read {
                Ok(summary) => group.push(subject.clone(), summary)?,
                Err(e) => warn!(subject = %subject, subtask, error = %format!("{e:#}"), "subject left out of group"),
            }
        }
        if group.is_empty() {
            warn!(subtask, "no subject summaries found, group tables not written");
            remove_stale(&self.layout.group_precision(subtask))?;
            remove_stale(&self.layout.group_one_threshold(subtask))?;
            return Ok(group);
        }

        let sweep_path = self.layout.group_precision(subtask);
        ensure_parent(&sweep_path)?;
        group.sweep_table(self.cfg.eval.sweep.thresholds())?.write(&sweep_path)?;
        group.one_threshold_table().write(&self.layout.group_one_threshold(subtask))?;
        info!(subtask, subjects = group.len(), "group tables written");
        Ok(group)
    }
}

/// `[2, T]` gaze from an eye-data table with `x` and `y` columns.
pub fn observed_gaze(table: &TsvTable) -> Result<Array2<f64>> {
    let col = |name: &str| {
        table
            .column(name)
            .ok_or_else(|| PipelineError::Alignment(format!("eye data has no '{name}' column")))
    };
    let (x, y) = (col("x")?, col("y")?);
    let mut out = Array2::<f64>::zeros((2, x.len()));
    out.row_mut(0).assign(&ndarray::ArrayView1::from(x));
    out.row_mut(1).assign(&ndarray::ArrayView1::from(y));
    Ok(out)
}
