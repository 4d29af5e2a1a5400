//! ONNX classifier - trained model via ONNX Runtime
//!
//! The model is loaded on first use and kept for the classifier's lifetime,
//! together with its manifest (the ordered feature names it was trained on).
//! A failed load is cached too: every job using this instance then fails with
//! `ModelUnavailable` instead of retrying the load.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use once_cell::sync::OnceCell;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{Classifier, Label, Prediction};
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::features::layout::{default_columns, layout_hash};
use crate::logic::features::vector::flatten;
use crate::logic::features::FeatureRow;

// ============================================================================
// MANIFEST
// ============================================================================

fn default_threshold() -> f32 {
    0.5
}

/// Sidecar JSON describing the model's input schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Input columns in training order
    pub feature_names: Vec<String>,
    /// Cut-off when the model emits scores instead of labels
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl ModelManifest {
    /// Read the manifest; a missing file falls back to the default layout
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            log::warn!(
                "No model manifest at {}, assuming default flow feature layout",
                path.display()
            );
            return Ok(Self {
                feature_names: default_columns(),
                threshold: default_threshold(),
            });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read manifest {}: {}", path.display(), e))?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| format!("invalid manifest {}: {}", path.display(), e))?;

        if manifest.feature_names.is_empty() {
            return Err(format!("manifest {} lists no features", path.display()));
        }
        Ok(manifest)
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

struct LoadedModel {
    session: Mutex<Session>,
    manifest: ModelManifest,
    label_output: String,
    probability_output: Option<String>,
}

pub struct OnnxClassifier {
    model_path: PathBuf,
    manifest_path: PathBuf,
    loaded: OnceCell<Result<LoadedModel, String>>,
}

impl OnnxClassifier {
    pub fn new(model_path: PathBuf, manifest_path: PathBuf) -> Self {
        Self {
            model_path,
            manifest_path,
            loaded: OnceCell::new(),
        }
    }

    fn model(&self) -> PipelineResult<&LoadedModel> {
        self.loaded
            .get_or_init(|| {
                let result = self.load();
                if let Err(e) = &result {
                    log::error!("ONNX classifier unavailable: {}", e);
                }
                result
            })
            .as_ref()
            .map_err(|e| PipelineError::ModelUnavailable(e.clone()))
    }

    fn load(&self) -> Result<LoadedModel, String> {
        log::info!("Loading ONNX model from: {}", self.model_path.display());

        if !self.model_path.exists() {
            return Err(format!("model not found: {}", self.model_path.display()));
        }

        let manifest = ModelManifest::load_or_default(&self.manifest_path)?;

        let session = Session::builder()
            .map_err(|e| format!("failed to create session builder: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| format!("failed to set optimization: {}", e))?
            .commit_from_file(&self.model_path)
            .map_err(|e| format!("failed to load model: {}", e))?;

        let mut output_names = session.outputs.iter().map(|o| o.name.clone());
        let label_output = output_names
            .next()
            .ok_or_else(|| "model defines no outputs".to_string())?;
        let probability_output = output_names.next();

        log::info!(
            "ONNX model loaded: {} features (layout {:08x}), outputs [{}{}]",
            manifest.feature_names.len(),
            layout_hash(&manifest.feature_names),
            label_output,
            probability_output.as_deref().map(|p| format!(", {}", p)).unwrap_or_default()
        );

        Ok(LoadedModel {
            session: Mutex::new(session),
            manifest,
            label_output,
            probability_output,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn required_columns(&self) -> PipelineResult<&[String]> {
        Ok(&self.model()?.manifest.feature_names)
    }

    fn classify(&self, rows: &[FeatureRow]) -> PipelineResult<Vec<Prediction>> {
        let model = self.model()?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let width = model.manifest.feature_names.len();
        if let Some(row) = rows.iter().find(|r| r.len() != width) {
            return Err(PipelineError::ClassificationFailed(format!(
                "row has {} values, model expects {}",
                row.len(),
                width
            )));
        }

        let n = rows.len();
        let input = Array2::<f32>::from_shape_vec((n, width), flatten(rows))
            .map_err(|e| PipelineError::ClassificationFailed(format!("array error: {}", e)))?;
        let input_tensor = Value::from_array(input)
            .map_err(|e| PipelineError::ClassificationFailed(format!("tensor error: {}", e)))?;

        let mut session = model.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PipelineError::ClassificationFailed(format!("inference failed: {}", e)))?;

        let label_value = outputs
            .get(model.label_output.as_str())
            .ok_or_else(|| PipelineError::ClassificationFailed("no label output".to_string()))?;

        let mut predictions = if let Ok((_, labels)) = label_value.try_extract_tensor::<i64>() {
            predictions_from_labels(labels, n)?
        } else {
            let (_, scores) = label_value
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::ClassificationFailed(format!("extract error: {}", e)))?;
            predictions_from_scores(scores, n, model.manifest.threshold)?
        };

        if let Some(name) = &model.probability_output {
            if let Some(Ok((_, probs))) = outputs
                .get(name.as_str())
                .map(|value| value.try_extract_tensor::<f32>())
            {
                if let Some(class_one) = class_one_probabilities(probs, n) {
                    for (prediction, p) in predictions.iter_mut().zip(class_one) {
                        prediction.confidence.get_or_insert(p);
                    }
                }
            }
        }

        Ok(predictions)
    }
}

// ============================================================================
// OUTPUT DECODING
// ============================================================================

/// Integer label tensor, one per row
fn predictions_from_labels(labels: &[i64], n: usize) -> PipelineResult<Vec<Prediction>> {
    if labels.len() != n {
        return Err(PipelineError::ClassificationFailed(format!(
            "model returned {} labels for {} rows",
            labels.len(),
            n
        )));
    }
    Ok(labels
        .iter()
        .map(|&raw| Prediction { label: Label::from_raw(raw), confidence: None })
        .collect())
}

/// Float output: one score per row, or `[p0, p1]` per row
fn predictions_from_scores(scores: &[f32], n: usize, threshold: f32) -> PipelineResult<Vec<Prediction>> {
    let class_one = class_one_probabilities(scores, n).ok_or_else(|| {
        PipelineError::ClassificationFailed(format!(
            "model returned {} scores for {} rows",
            scores.len(),
            n
        ))
    })?;

    Ok(class_one
        .into_iter()
        .map(|p| Prediction {
            label: if p >= threshold { Label::Malicious } else { Label::Benign },
            confidence: Some(p),
        })
        .collect())
}

fn class_one_probabilities(data: &[f32], n: usize) -> Option<Vec<f32>> {
    if n == 0 {
        return Some(Vec::new());
    }
    if data.len() == n {
        Some(data.to_vec())
    } else if data.len() == n * 2 {
        Some(data.chunks(2).map(|pair| pair[1]).collect())
    } else {
        None
    }
}
