//! Pipeline configuration
//!
//! One explicit object handed to the pipeline, extractor and dispatcher at
//! construction. Loaded from environment variables, defaults in `constants.rs`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;

/// Which classifier variant is registered at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Stub,
    Onnx,
}

impl ClassifierKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stub" | "dummy" => Some(ClassifierKind::Stub),
            "onnx" | "model" => Some(ClassifierKind::Onnx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Uploaded captures land here
    pub input_dir: PathBuf,

    /// Parent of per-job extraction output directories
    pub output_dir: PathBuf,

    /// Directory trigger source
    pub watch_dir: PathBuf,

    /// Start the directory watcher
    pub watch_enabled: bool,

    /// Alert log path
    pub alerts_file: PathBuf,

    /// Extractor image identifier
    pub extractor_image: String,

    /// Container engine executable
    pub extractor_program: String,

    /// Wait between output polls once the extractor exits
    pub settle_delay: Duration,

    /// Capture extension accepted by the watcher (without dot)
    pub capture_extension: String,

    /// Worker pool size
    pub workers: usize,

    pub classifier: ClassifierKind,
    pub model_path: PathBuf,
    pub model_manifest: Option<PathBuf>,
    pub stub_seed: u64,

    /// Write `<table>_predictions.csv` next to each flow table
    pub save_predictions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
            watch_enabled: true,
            alerts_file: PathBuf::from(DEFAULT_ALERTS_FILE),
            extractor_image: DEFAULT_EXTRACTOR_IMAGE.to_string(),
            extractor_program: DEFAULT_EXTRACTOR_PROGRAM.to_string(),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            capture_extension: DEFAULT_CAPTURE_EXTENSION.to_string(),
            workers: DEFAULT_WORKERS,
            classifier: ClassifierKind::Stub,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_manifest: None,
            stub_seed: DEFAULT_STUB_SEED,
            save_predictions: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (environment, test map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |key: &str, fallback: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(fallback);
        let flag = |key: &str, fallback: bool| {
            lookup(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(fallback)
        };

        let classifier = match lookup("CLASSIFIER") {
            Some(value) => ClassifierKind::parse(&value).unwrap_or_else(|| {
                log::warn!("Unknown CLASSIFIER '{}', using stub", value);
                ClassifierKind::Stub
            }),
            None => defaults.classifier,
        };

        Self {
            input_dir: path("INPUT_DIR", defaults.input_dir),
            output_dir: path("OUTPUT_DIR", defaults.output_dir),
            watch_dir: path("WATCH_DIR", defaults.watch_dir),
            watch_enabled: flag("WATCH_ENABLED", defaults.watch_enabled),
            alerts_file: path("ALERTS_FILE", defaults.alerts_file),
            extractor_image: lookup("EXTRACTOR_IMAGE").unwrap_or(defaults.extractor_image),
            extractor_program: lookup("EXTRACTOR_PROGRAM").unwrap_or(defaults.extractor_program),
            settle_delay: lookup("EXTRACTOR_SETTLE_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            capture_extension: lookup("CAPTURE_EXTENSION")
                .map(|v| v.trim_start_matches('.').to_string())
                .unwrap_or(defaults.capture_extension),
            workers: lookup("WORKERS")
                .and_then(|v| v.parse().ok())
                .map(|n: usize| n.max(1))
                .unwrap_or(defaults.workers),
            classifier,
            model_path: path("MODEL_PATH", defaults.model_path),
            model_manifest: lookup("MODEL_MANIFEST").map(PathBuf::from),
            stub_seed: lookup("STUB_SEED")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stub_seed),
            save_predictions: flag("SAVE_PREDICTIONS", defaults.save_predictions),
        }
    }

    /// Manifest path: explicit, or `<model>.json` next to the model
    pub fn manifest_path(&self) -> PathBuf {
        self.model_manifest
            .clone()
            .unwrap_or_else(|| self.model_path.with_extension("json"))
    }
}
