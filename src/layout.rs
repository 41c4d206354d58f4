//! Derivatives directory layout.
//!
//! ```text
//! <root>/
//!   pp_data/<sub>/eyetracking/
//!     <sub>_task-<task>_run_NN_eyedata.tsv.gz
//!     <sub>_task-<task>_subtask-<st>_run_NN_ee.tsv.gz
//!     <sub>_task-<task>_subtask-<st>_precision_summary.tsv
//!     <sub>_task-<task>_subtask-<st>_precision_one_threshold_summary.tsv
//!   deepmreye_calib/
//!     exp_design/<sub>/<sub>_<ses>_task-<task>_run-NN_design_matrix.tsv
//!     masks/<sub>/<sub>_run_NN_mask.safetensors
//!     model/
//!       gaze_labels/<sub>_run_NN_training_labels.safetensors
//!       <sub>_pred_median.tsv
//!       <sub>_pred_subtr.tsv
//!   group/eyetracking/
//!     group_task-<task>_subtask-<st>_precision.tsv
//!     group_task-<task>_subtask-<st>_precision_one_threshold.tsv
//! ```
//!
//! Run numbers are 1-based.  Every output is rewritten from scratch on each
//! invocation; outputs of runs that no longer complete are removed.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Path builder rooted at a derivatives directory.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    task: String,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, task: impl Into<String>) -> Self {
        Self { root: root.into(), task: task.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn eyetracking_dir(&self, sub: &str) -> PathBuf {
        self.root.join("pp_data").join(sub).join("eyetracking")
    }

    pub fn eyedata(&self, sub: &str, run: usize) -> PathBuf {
        self.eyetracking_dir(sub)
            .join(format!("{sub}_task-{}_run_{run:02}_eyedata.tsv.gz", self.task))
    }

    pub fn euclidean_error(&self, sub: &str, subtask: &str, run: usize) -> PathBuf {
        self.eyetracking_dir(sub).join(format!(
            "{sub}_task-{}_subtask-{subtask}_run_{run:02}_ee.tsv.gz",
            self.task
        ))
    }

    pub fn precision_summary(&self, sub: &str, subtask: &str) -> PathBuf {
        self.eyetracking_dir(sub).join(format!(
            "{sub}_task-{}_subtask-{subtask}_precision_summary.tsv",
            self.task
        ))
    }

    pub fn one_threshold_summary(&self, sub: &str, subtask: &str) -> PathBuf {
        self.eyetracking_dir(sub).join(format!(
            "{sub}_task-{}_subtask-{subtask}_precision_one_threshold_summary.tsv",
            self.task
        ))
    }

    pub fn calib_dir(&self) -> PathBuf {
        self.root.join("deepmreye_calib")
    }

    pub fn design_matrix(&self, sub: &str, session: &str, run: usize) -> PathBuf {
        self.calib_dir().join("exp_design").join(sub).join(format!(
            "{sub}_{session}_task-{}_run-{run:02}_design_matrix.tsv",
            self.task
        ))
    }

    pub fn mask(&self, sub: &str, run: usize) -> PathBuf {
        self.calib_dir()
            .join("masks")
            .join(sub)
            .join(format!("{sub}_run_{run:02}_mask.safetensors"))
    }

    pub fn model_dir(&self) -> PathBuf {
        self.calib_dir().join("model")
    }

    pub fn label_dir(&self) -> PathBuf {
        self.model_dir().join("gaze_labels")
    }

    pub fn label(&self, sub: &str, run: usize) -> PathBuf {
        self.label_dir()
            .join(format!("{sub}_run_{run:02}_training_labels.safetensors"))
    }

    pub fn pred_median(&self, sub: &str) -> PathBuf {
        self.model_dir().join(format!("{sub}_pred_median.tsv"))
    }

    pub fn pred_subtr(&self, sub: &str) -> PathBuf {
        self.model_dir().join(format!("{sub}_pred_subtr.tsv"))
    }

    pub fn group_dir(&self) -> PathBuf {
        self.root.join("group").join("eyetracking")
    }

    pub fn group_precision(&self, subtask: &str) -> PathBuf {
        self.group_dir()
            .join(format!("group_task-{}_subtask-{subtask}_precision.tsv", self.task))
    }

    pub fn group_one_threshold(&self, subtask: &str) -> PathBuf {
        self.group_dir().join(format!(
            "group_task-{}_subtask-{subtask}_precision_one_threshold.tsv",
            self.task
        ))
    }
}

/// Create the parent directory of `path`.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(())
}

/// Remove a previous output.  A missing file is fine.
pub fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "stale output removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
