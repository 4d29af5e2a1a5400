//! Job records and their public snapshots

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::logic::artifact::{ArtifactOrigin, CaptureArtifact, JobKey};
use crate::logic::error::{ErrorKind, PipelineError};
use crate::logic::pipeline::JobOutcome;

/// Queued → Running → {Succeeded, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Terminal failure of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PipelineError> for JobError {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// What a succeeded attempt leaves in the job table
///
/// Alerts themselves live in the alert log and are not retained here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub flow_tables: Vec<String>,
    pub flows_scored: usize,
    pub alert_count: usize,
    pub alerts_appended: usize,
}

impl From<&JobOutcome> for JobSummary {
    fn from(outcome: &JobOutcome) -> Self {
        Self {
            flow_tables: outcome.flow_tables.clone(),
            flows_scored: outcome.flows_scored,
            alert_count: outcome.alerts.len(),
            alerts_appended: outcome.alerts_appended,
        }
    }
}

pub(crate) type JobResult = Result<JobSummary, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub key: JobKey,
    pub artifact: String,
    pub origin: ArtifactOrigin,
    pub state: JobState,
    pub attempt: u32,
    pub output_dir: PathBuf,
    pub flow_tables: Vec<String>,
    pub flows_scored: usize,
    pub alert_count: usize,
    pub alerts_appended: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Dispatcher-side record of the current attempt for one key
pub(crate) struct JobEntry {
    pub key: JobKey,
    pub artifact: CaptureArtifact,
    pub state: JobState,
    pub attempt: u32,
    pub output_dir: PathBuf,
    pub summary: Option<JobSummary>,
    pub error: Option<JobError>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Running pipeline task, aborted on shutdown
    pub task: Option<AbortHandle>,
    /// Set once when the attempt ends
    pub done: watch::Sender<Option<JobResult>>,
}

impl JobEntry {
    pub fn new(key: JobKey, artifact: CaptureArtifact, attempt: u32, output_dir: PathBuf) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            key,
            artifact,
            state: JobState::Queued,
            attempt,
            output_dir,
            summary: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            task: None,
            done,
        }
    }

    pub fn finish(&mut self, result: JobResult) {
        self.finished_at = Some(Utc::now());
        self.task = None;
        match &result {
            Ok(summary) => {
                self.state = JobState::Succeeded;
                self.summary = Some(summary.clone());
            }
            Err(error) => {
                self.state = JobState::Failed;
                self.error = Some(error.clone());
            }
        }
        self.done.send_replace(Some(result));
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let summary = self.summary.as_ref();
        JobSnapshot {
            key: self.key.clone(),
            artifact: self.artifact.name.clone(),
            origin: self.artifact.origin,
            state: self.state,
            attempt: self.attempt,
            output_dir: self.output_dir.clone(),
            flow_tables: summary.map(|s| s.flow_tables.clone()).unwrap_or_default(),
            flows_scored: summary.map(|s| s.flows_scored).unwrap_or(0),
            alert_count: summary.map(|s| s.alert_count).unwrap_or(0),
            alerts_appended: summary.map(|s| s.alerts_appended).unwrap_or(0),
            error: self.error.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}
