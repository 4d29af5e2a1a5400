//! Pipeline errors
//!
//! Every failure a job can end with. The dispatcher records the kind and
//! message as the job's terminal state; the upload gateway turns them into
//! HTTP error bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Container engine or extractor image missing
    #[error("extraction environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// Extractor process exited non-zero (or produced an unreadable table)
    #[error("flow extraction failed{}: {detail}", exit_suffix(.code))]
    ExtractionFailed { code: Option<i32>, detail: String },

    /// Extractor exited cleanly but wrote no flow table
    #[error("no flow tables produced in {0}")]
    NoOutputProduced(String),

    /// Model artifact missing or not loadable
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model loaded but inference failed
    #[error("classification failed: {0}")]
    ClassificationFailed(String),

    /// Alert log could not be written
    #[error("alert storage failure: {0}")]
    StorageFailure(String),

    /// Attempt stopped by dispatcher shutdown
    #[error("job cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Serializable error kind, recorded on failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EnvironmentUnavailable,
    ExtractionFailed,
    NoOutputProduced,
    ModelUnavailable,
    ClassificationFailed,
    StorageFailure,
    Cancelled,
    Internal,
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit code {})", c)).unwrap_or_default()
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EnvironmentUnavailable(_) => ErrorKind::EnvironmentUnavailable,
            PipelineError::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            PipelineError::NoOutputProduced(_) => ErrorKind::NoOutputProduced,
            PipelineError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            PipelineError::ClassificationFailed(_) => ErrorKind::ClassificationFailed,
            PipelineError::StorageFailure(_) => ErrorKind::StorageFailure,
            PipelineError::Cancelled(_) => ErrorKind::Cancelled,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn extraction(detail: impl Into<String>) -> Self {
        PipelineError::ExtractionFailed { code: None, detail: detail.into() }
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EnvironmentUnavailable => "environment_unavailable",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::NoOutputProduced => "no_output_produced",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::ClassificationFailed => "classification_failed",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
