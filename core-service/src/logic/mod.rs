//! Logic Module - Pipeline Components & Engines
//!
//! Leaf-first:
//! - `extraction/` - external flow extractor invocation, flow tables
//! - `features/` - feature layout and schema reconciliation
//! - `model/` - pluggable classifiers (stub, ONNX)
//! - `alerts/` - alert building and the append-only alert log
//! - `pipeline` - extract → reconcile → classify → alert, per job
//! - `dispatcher/` - job queue, worker pool, job state machine
//! - `watcher` - directory trigger

pub mod error;
pub mod config;
pub mod artifact;

pub mod extraction;
pub mod features;
pub mod model;
pub mod alerts;

pub mod pipeline;
pub mod dispatcher;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;
