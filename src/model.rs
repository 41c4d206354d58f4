//! Training datasets and the external model service.
//!
//! ```text
//! masks/<sub>/<sub>_run_NN_mask.safetensors      "mask"   [X, Y, Z, T] ─┐
//!                                                                       ├─ TrainingRun
//! model/gaze_labels/<sub>_run_NN_…safetensors    "labels" [T, sub, 2] ──┘
//!        │
//!        └─→ SubjectDataset (completed runs only)
//!                │
//!                └─→ ModelService::train_and_evaluate  ─→  Evaluation per subject
//!                        │
//!                        └─→ <sub>_pred_median.tsv, <sub>_pred_subtr.tsv
//! ```
//!
//! The model itself is a black box behind [`ModelService`].  A run is left out
//! of its subject's dataset when a file is missing or when the number of
//! volumes differs from the number of label TRs.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use ndarray::{Array3, Array4, Ix4};
use tracing::{info, warn};

use crate::config::Hyperparameters;
use crate::error::{classify, PipelineError};
use crate::io::{read_label, SafeTensors, TensorWriter};
use crate::layout::{ensure_parent, remove_stale, Layout};
use crate::normalize::normalize_volumes;
use crate::prediction::{flatten_subtr, median_per_tr, median_table, Evaluation};

/// One run's normalized volumes and matching label.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub run: usize,
    /// `[X, Y, Z, T]`.
    pub volumes: Array4<f32>,
    /// `[T, points_per_TR, 2]`.
    pub label: Array3<f32>,
}

/// Completed training runs of one subject.
#[derive(Debug, Clone)]
pub struct SubjectDataset {
    pub subject: String,
    pub runs: Vec<TrainingRun>,
}

impl SubjectDataset {
    /// Total number of labelled volumes.
    pub fn n_samples(&self) -> usize {
        self.runs.iter().map(|r| r.label.dim().0).sum()
    }
}

/// Load, normalize and check one run.
pub fn load_training_run(layout: &Layout, subject: &str, run: usize) -> Result<TrainingRun> {
    let mask_path = layout.mask(subject, run);
    let label_path = layout.label(subject, run);

    let volumes = SafeTensors::load(&mask_path)?
        .array_dyn("mask")?
        .mapv(|v| v as f32)
        .into_dimensionality::<Ix4>()
        .with_context(|| format!("{}: mask must be [X, Y, Z, T]", mask_path.display()))?;
    let label = read_label(&label_path)?;

    let n_vol = volumes.dim().3;
    if n_vol != label.dim().0 {
        return Err(PipelineError::Alignment(format!(
            "mask {:?} vs label {:?}",
            volumes.shape(),
            label.shape()
        ))
        .into());
    }
    let mut volumes = volumes;
    normalize_volumes(&mut volumes);
    Ok(TrainingRun { run, volumes, label })
}

/// Load every run of a subject, skipping runs that fail.
pub fn load_subject_dataset(layout: &Layout, subject: &str, num_run: usize) -> SubjectDataset {
    let mut runs = Vec::new();
    for run in 1..=num_run {
        match load_training_run(layout, subject, run) {
            Ok(r) => runs.push(r),
            Err(e) => {
                let kind = classify(&e).map_or("other", PipelineError::kind);
                warn!(subject, run, kind, error = %e, "skipping training run");
            }
        }
    }
    SubjectDataset { subject: subject.to_string(), runs }
}

/// Black-box model training and evaluation.
pub trait ModelService {
    /// Train on `datasets` and return one evaluation per dataset, keyed by
    /// subject.  Datasets absent from the result are treated as failed.
    fn train_and_evaluate(
        &mut self,
        datasets: &[SubjectDataset],
        hyperparameters: &Hyperparameters,
    ) -> Result<BTreeMap<String, Evaluation>>;
}

/// Exclusive lock on an output directory, released on drop.
#[derive(Debug)]
pub struct OutputLock {
    path: PathBuf,
}

impl OutputLock {
    pub const FILE_NAME: &'static str = ".gazecal.lock";

    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(Self::FILE_NAME);
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("output directory {} is locked", dir.display()))?;
        Ok(Self { path })
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

/// Train, evaluate and persist prediction tables for every subject.
pub fn run_training<S: ModelService + ?Sized>(
    service: &mut S,
    layout: &Layout,
    datasets: &[SubjectDataset],
    hyperparameters: &Hyperparameters,
) -> Result<BTreeMap<String, Evaluation>> {
    let datasets: Vec<SubjectDataset> = datasets
        .iter()
        .filter(|d| {
            if d.runs.is_empty() {
                warn!(subject = %d.subject, "no usable training runs, subject left out");
            }
            !d.runs.is_empty()
        })
        .cloned()
        .collect();
    if datasets.is_empty() {
        bail!("no subject has a usable training run");
    }

    let _lock = OutputLock::acquire(&layout.model_dir())?;
    for d in &datasets {
        remove_stale(&layout.pred_median(&d.subject))?;
        remove_stale(&layout.pred_subtr(&d.subject))?;
    }
    info!(subjects = datasets.len(), "training model");
    let evaluations = service.train_and_evaluate(&datasets, hyperparameters)?;

    for d in &datasets {
        let Some(ev) = evaluations.get(&d.subject) else {
            warn!(subject = %d.subject, "no evaluation returned");
            continue;
        };
        let median_path = layout.pred_median(&d.subject);
        ensure_parent(&median_path)?;
        median_table(&median_per_tr(ev)).write(&median_path)?;
        flatten_subtr(ev).to_table().write(&layout.pred_subtr(&d.subject))?;
        info!(subject = %d.subject, n_tr = ev.n_tr(), "predictions written");
    }
    Ok(evaluations)
}

/// Runs an external program on a work directory.
///
/// Inputs written before the call:
///   `<work>/hyperparameters.json`
///   `<work>/<sub>_dataset.safetensors` with `run_NN_volumes` and `run_NN_labels`
///
/// The program is invoked as `<program> <args...> <work>` and must leave one
/// `<work>/<sub>_evaluation.safetensors` per dataset with `pred_y` and
/// `euc_pred`.
#[derive(Debug, Clone)]
pub struct CommandService {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl CommandService {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), work_dir: work_dir.into() }
    }

    pub fn dataset_path(&self, subject: &str) -> PathBuf {
        self.work_dir.join(format!("{subject}_dataset.safetensors"))
    }

    pub fn evaluation_path(&self, subject: &str) -> PathBuf {
        self.work_dir.join(format!("{subject}_evaluation.safetensors"))
    }

    fn write_inputs(&self, datasets: &[SubjectDataset], hyperparameters: &Hyperparameters) -> Result<()> {
        std::fs::create_dir_all(&self.work_dir)
            .with_context(|| format!("creating {}", self.work_dir.display()))?;
        let hp = serde_json::to_string_pretty(hyperparameters)?;
        std::fs::write(self.work_dir.join("hyperparameters.json"), hp)?;
        for d in datasets {
            let mut w = TensorWriter::new();
            for r in &d.runs {
                w.add_array(&format!("run_{:02}_volumes", r.run), &r.volumes);
                w.add_array(&format!("run_{:02}_labels", r.run), &r.label);
            }
            w.write(&self.dataset_path(&d.subject))?;
        }
        Ok(())
    }

    fn read_evaluation(&self, subject: &str) -> Result<Evaluation> {
        let st = SafeTensors::load(&self.evaluation_path(subject))?;
        Evaluation::new(st.array3("pred_y")?, st.array2("euc_pred")?)
    }
}

impl ModelService for CommandService {
    fn train_and_evaluate(
        &mut self,
        datasets: &[SubjectDataset],
        hyperparameters: &Hyperparameters,
    ) -> Result<BTreeMap<String, Evaluation>> {
        self.write_inputs(datasets, hyperparameters)?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.work_dir)
            .status()
            .with_context(|| format!("launching {}", self.program.display()))?;
        if !status.success() {
            bail!("{} exited with {status}", self.program.display());
        }

        let mut out = BTreeMap::new();
        for d in datasets {
            match self.read_evaluation(&d.subject) {
                Ok(ev) => {
                    out.insert(d.subject.clone(), ev);
                }
                Err(e) => warn!(subject = %d.subject, error = %e, "evaluation unreadable"),
            }
        }
        Ok(out)
    }
}
