//! Alerts Module - findings for malicious flows
//!
//! - `record` - the persisted alert and its identity triple
//! - `builder` - labeled rows → alerts
//! - `store` - append-only JSONL alert log

pub mod record;
pub mod builder;
pub mod store;

pub use record::{Alert, AlertIdentity};
pub use builder::build_alerts;
pub use store::AlertStore;
