//! Model Module - pluggable flow classifiers
//!
//! A classifier declares the columns it needs and labels reconciled rows.
//! Variants are registered at startup from configuration; the pipeline only
//! sees `Arc<dyn Classifier>`.

pub mod stub;
pub mod inference;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::MALICIOUS_LABEL;
use crate::logic::config::{ClassifierKind, PipelineConfig};
use crate::logic::error::PipelineResult;
use crate::logic::features::FeatureRow;

pub use inference::{ModelManifest, OnnxClassifier};
pub use stub::StubClassifier;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Binary flow label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum Label {
    Benign,
    Malicious,
}

impl Label {
    /// Anything but the malicious value is benign
    pub fn from_raw(value: i64) -> Self {
        if value == MALICIOUS_LABEL as i64 {
            Label::Malicious
        } else {
            Label::Benign
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Label::Benign => 0,
            Label::Malicious => MALICIOUS_LABEL,
        }
    }

    pub fn is_malicious(&self) -> bool {
        *self == Label::Malicious
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> Self {
        label.as_u8()
    }
}

impl From<u8> for Label {
    fn from(value: u8) -> Self {
        Label::from_raw(value as i64)
    }
}

/// One classification, 1:1 with an input row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    /// Probability of the malicious class, if the model reports one
    pub confidence: Option<f32>,
}

// ============================================================================
// CLASSIFIER CAPABILITY
// ============================================================================

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Ordered input columns; stable for the classifier's lifetime
    fn required_columns(&self) -> PipelineResult<&[String]>;

    /// One prediction per row, same order
    fn classify(&self, rows: &[FeatureRow]) -> PipelineResult<Vec<Prediction>>;
}

/// Instantiate the configured classifier
pub fn build_classifier(config: &PipelineConfig) -> Arc<dyn Classifier> {
    match config.classifier {
        ClassifierKind::Stub => {
            log::info!("Classifier: deterministic stub (seed {})", config.stub_seed);
            Arc::new(StubClassifier::new(config.stub_seed))
        }
        ClassifierKind::Onnx => {
            log::info!("Classifier: ONNX model {}", config.model_path.display());
            Arc::new(OnnxClassifier::new(config.model_path.clone(), config.manifest_path()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_raw() {
        assert_eq!(Label::from_raw(1), Label::Malicious);
        assert_eq!(Label::from_raw(0), Label::Benign);
        assert_eq!(Label::from_raw(2), Label::Benign);
        assert!(Label::Malicious.is_malicious());
    }

    #[test]
    fn test_label_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Label::Malicious).unwrap(), "1");
        let label: Label = serde_json::from_str("0").unwrap();
        assert_eq!(label, Label::Benign);
    }

    #[test]
    fn test_build_classifier_variants() {
        let config = PipelineConfig::default();
        assert_eq!(build_classifier(&config).name(), "stub");

        let config = PipelineConfig {
            classifier: ClassifierKind::Onnx,
            ..PipelineConfig::default()
        };
        assert_eq!(build_classifier(&config).name(), "onnx");
    }
}
