//! Features Module - classifier input schema
//!
//! - `layout` - default flow feature layout (extractor column names)
//! - `vector` - one reconciled numeric row
//! - `reconcile` - project any flow table onto a classifier's columns

pub mod layout;
pub mod vector;
pub mod reconcile;

pub use layout::{layout_hash, FLOW_FEATURE_LAYOUT};
pub use vector::FeatureRow;
pub use reconcile::{parse_cell, reconcile};
