//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! `PipelineConfig::from_env` falls back to these.

/// Default directory where uploaded captures are stored
pub const DEFAULT_INPUT_DIR: &str = "data/input";

/// Default parent directory for per-job extraction output
pub const DEFAULT_OUTPUT_DIR: &str = "data/out";

/// Default directory watched for new captures
pub const DEFAULT_WATCH_DIR: &str = "data/input";

/// Default alert log (JSONL)
pub const DEFAULT_ALERTS_FILE: &str = "data/alerts.jsonl";

/// Default flow extractor image
pub const DEFAULT_EXTRACTOR_IMAGE: &str = "cicflowmeter:offline";

/// Container engine used to run the extractor
pub const DEFAULT_EXTRACTOR_PROGRAM: &str = "docker";

/// Delay between output polls after the extractor exits (ms)
pub const DEFAULT_SETTLE_MS: u64 = 1000;

/// Capture file extension picked up by the watcher
pub const DEFAULT_CAPTURE_EXTENSION: &str = "pcap";

/// Worker pool size
pub const DEFAULT_WORKERS: usize = 2;

/// Default ONNX model location
pub const DEFAULT_MODEL_PATH: &str = "models/flow_classifier.onnx";

/// Stub classifier seed
pub const DEFAULT_STUB_SEED: u64 = 42;

/// Default number of alerts returned by a recent-read
pub const DEFAULT_ALERT_LIMIT: usize = 100;

// ============================================
// Extractor container contract
// ============================================

/// Where the capture (or its directory) is mounted inside the container
pub const CONTAINER_INPUT_DIR: &str = "/data";

/// Where the container writes flow tables
pub const CONTAINER_OUTPUT_DIR: &str = "/out";

/// Suffix every extractor output table carries
pub const FLOW_TABLE_SUFFIX: &str = "_Flow.csv";

/// Number of output polls after the extractor exits
pub const SETTLE_POLLS: u32 = 3;

/// Label value for malicious flows
pub const MALICIOUS_LABEL: u8 = 1;
