//! Feature Reconciler
//!
//! Projects an extractor table onto exactly the columns a classifier expects:
//! missing columns become zero, extra columns are dropped, order follows the
//! classifier. Every cell is coerced to a number; anything unparsable is zero.
//! Total and deterministic.

use super::vector::FeatureRow;
use crate::logic::extraction::FlowTable;

/// Numeric value of one cell; unparsable or NaN becomes 0
pub fn parse_cell(raw: &str) -> f32 {
    match raw.trim().parse::<f64>() {
        Ok(value) if !value.is_nan() => value as f32,
        _ => 0.0,
    }
}

pub fn reconcile(table: &FlowTable, required_columns: &[String]) -> Vec<FeatureRow> {
    // Source index per required column, None = zero-fill
    let sources: Vec<Option<usize>> = required_columns
        .iter()
        .map(|column| table.column_index(column))
        .collect();

    let missing: Vec<&str> = required_columns
        .iter()
        .zip(&sources)
        .filter(|(_, source)| source.is_none())
        .map(|(column, _)| column.as_str())
        .collect();
    if !missing.is_empty() {
        log::debug!(
            "{}: {} of {} required columns missing, zero-filled ({}{})",
            table.name,
            missing.len(),
            required_columns.len(),
            missing.iter().take(5).cloned().collect::<Vec<_>>().join(", "),
            if missing.len() > 5 { ", ..." } else { "" }
        );
    }

    table
        .rows
        .iter()
        .map(|row| {
            let values = sources
                .iter()
                .map(|source| {
                    source
                        .and_then(|idx| row.get(idx))
                        .map(|cell| parse_cell(cell))
                        .unwrap_or(0.0)
                })
                .collect();
            FeatureRow::new(values)
        })
        .collect()
}
