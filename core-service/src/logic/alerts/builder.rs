//! Alert Builder - labeled rows → alerts

use chrono::Utc;

use super::record::Alert;
use crate::logic::artifact::{CaptureArtifact, JobKey};
use crate::logic::extraction::FlowTable;
use crate::logic::model::Prediction;

/// One alert per malicious row, in row order. All alerts of one call share
/// a timestamp.
pub fn build_alerts(
    artifact: &CaptureArtifact,
    key: &JobKey,
    table: &FlowTable,
    predictions: &[Prediction],
) -> Vec<Alert> {
    let timestamp = Utc::now();

    predictions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.label.is_malicious())
        .map(|(row, p)| Alert {
            timestamp,
            pcap: artifact.name.clone(),
            artifact_key: Some(key.clone()),
            flow_file: table.name.clone(),
            row,
            prediction: p.label.as_u8(),
            confidence: p.confidence,
            flow: table.summary(row),
        })
        .collect()
}
