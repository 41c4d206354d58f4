//! Error taxonomy for per-run failures.
//!
//! Library functions return `anyhow::Result` and attach one of these as the
//! root cause when a failure belongs to a known class.  The batch layer
//! downcasts to decide whether a run is skipped or the whole invocation stops.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The signal cannot be sanitized (no valid samples left to work from).
    #[error("data quality: {0}")]
    DataQuality(String),

    /// Shapes or sample counts that should agree do not.
    #[error("alignment: {0}")]
    Alignment(String),

    /// An expected input file does not exist.
    #[error("missing input: {}", .0.display())]
    MissingInput(PathBuf),

    /// Unrecognised method name or invalid parameter in the settings.
    #[error("configuration: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Short lowercase tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DataQuality(_) => "data_quality",
            PipelineError::Alignment(_) => "alignment",
            PipelineError::MissingInput(_) => "missing_input",
            PipelineError::Configuration(_) => "configuration",
        }
    }
}

/// Classify an `anyhow` error by looking for a [`PipelineError`] in its chain.
pub fn classify(err: &anyhow::Error) -> Option<&PipelineError> {
    err.chain().find_map(|e| e.downcast_ref::<PipelineError>())
}
