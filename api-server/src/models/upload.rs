//! Upload models

use serde::{Deserialize, Serialize};

use flowguard_core::{Alert, JobSnapshot};

#[derive(Debug, Deserialize, Default)]
pub struct UploadParams {
    /// Block until the job finishes
    #[serde(default)]
    pub wait: bool,
}

/// 202 body: capture stored, job handed to the dispatcher
#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    /// `queued`, `in_progress` or `completed`
    pub status: &'static str,
    pub file: String,
    pub job: JobSnapshot,
}

/// 200 body for `?wait=true`
#[derive(Debug, Serialize)]
pub struct UploadCompleted {
    pub pcap: String,
    pub job: JobSnapshot,
    pub alerts: Vec<Alert>,
}
