//! FlowGuard Core
//!
//! Capture artifacts in, alerts out. The pipeline runs the external flow
//! extractor over a capture, aligns each flow table with the classifier's
//! feature schema, scores every flow and appends alerts for the malicious
//! ones to a JSONL log.
//!
//! ```text
//!  Upload / Watcher ──► Dispatcher ──► Pipeline
//!                                        │
//!          extract ─► reconcile ─► classify ─► build alerts ─► AlertStore
//! ```

pub mod constants;
pub mod logic;

pub use logic::alerts::{Alert, AlertStore};
pub use logic::artifact::{ArtifactOrigin, CaptureArtifact, JobKey};
pub use logic::config::{ClassifierKind, PipelineConfig};
pub use logic::dispatcher::{Dispatcher, JobError, JobSnapshot, JobState, JobSummary, Submission, WaitError};
pub use logic::error::{ErrorKind, PipelineError, PipelineResult};
pub use logic::pipeline::{extract_offline, JobOutcome, Pipeline, TableReport};
pub use logic::watcher::DirectoryWatcher;
