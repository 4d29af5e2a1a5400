//! Feature Row - one reconciled classifier input row

use serde::{Deserialize, Serialize};

/// Numeric values in the classifier's declared column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow(Vec<f32>);

impl FeatureRow {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bit-exact CRC32 of the row
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for value in &self.0 {
            hasher.update(&value.to_bits().to_le_bytes());
        }
        hasher.finalize()
    }
}

/// Flatten rows into a row-major buffer
pub fn flatten(rows: &[FeatureRow]) -> Vec<f32> {
    let width = rows.first().map(FeatureRow::len).unwrap_or(0);
    let mut data = Vec::with_capacity(rows.len() * width);
    for row in rows {
        data.extend_from_slice(row.values());
    }
    data
}
