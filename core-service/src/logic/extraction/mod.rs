//! Extraction Module - external flow extractor
//!
//! The extractor is an opaque containerised tool: capture in, `*_Flow.csv`
//! tables out. Process spawning sits behind `ProcessRunner` so the invoker
//! can be driven by a fake in tests.

pub mod runner;
pub mod invoker;
pub mod table;

#[cfg(test)]
mod tests;

pub use runner::{ProcessOutput, ProcessRunner, SystemRunner};
pub use invoker::{ExtractorSettings, FlowExtractor, FlowTableRef};
pub use table::FlowTable;
