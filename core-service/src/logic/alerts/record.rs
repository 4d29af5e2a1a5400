//! Alert record - one JSON line in the alert log

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::artifact::JobKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Build time, not extraction time
    pub timestamp: DateTime<Utc>,
    /// Capture artifact name
    pub pcap: String,
    /// Absent on records written before job keys existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<JobKey>,
    pub flow_file: String,
    #[serde(alias = "row_index")]
    pub row: usize,
    #[serde(alias = "label")]
    pub prediction: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Selected identity fields of the flow
    #[serde(default)]
    pub flow: BTreeMap<String, String>,
}

/// (artifact, flow table, row): the same finding is never stored twice
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertIdentity {
    pub artifact: String,
    pub flow_file: String,
    pub row: usize,
}

impl Alert {
    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity {
            artifact: self
                .artifact_key
                .as_ref()
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| self.pcap.clone()),
            flow_file: self.flow_file.clone(),
            row: self.row,
        }
    }
}
