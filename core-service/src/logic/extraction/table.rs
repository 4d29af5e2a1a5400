//! Flow tables - CSV output of the extractor

use std::collections::BTreeMap;
use std::path::Path;

use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::features::FeatureRow;
use crate::logic::model::Prediction;

/// Identity fields copied into an alert's flow summary, when present
pub const SUMMARY_FIELDS: &[&str] = &[
    "Flow ID",
    "Src IP",
    "Src Port",
    "Dst IP",
    "Dst Port",
    "Protocol",
    "Timestamp",
];

/// One extractor output table, kept as raw text cells
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl FlowTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { name: name.into(), columns, rows }
    }

    /// Read a table from disk; ragged rows are kept as-is
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(path)
            .map_err(|e| PipelineError::extraction(format!("cannot open flow table {}: {}", name, e)))?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| PipelineError::extraction(format!("bad header in {}: {}", name, e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PipelineError::extraction(format!("bad row in {}: {}", name, e)))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        log::debug!("Loaded flow table {} ({} rows, {} columns)", name, rows.len(), columns.len());
        Ok(Self { name, columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column; first occurrence wins on duplicates
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Identity fields of one row for alert context
    pub fn summary(&self, row: usize) -> BTreeMap<String, String> {
        SUMMARY_FIELDS
            .iter()
            .filter_map(|field| {
                let idx = self.column_index(field)?;
                let value = self.cell(row, idx)?.trim();
                (!value.is_empty()).then(|| (field.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Write the reconciled matrix plus a `Prediction` column
pub fn write_predictions(
    path: &Path,
    columns: &[String],
    rows: &[FeatureRow],
    predictions: &[Prediction],
) -> PipelineResult<()> {
    let io_err = |e: csv::Error| PipelineError::StorageFailure(format!("cannot write {}: {}", path.display(), e));

    let mut writer = csv::Writer::from_path(path).map_err(io_err)?;

    let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
    header.push("Prediction");
    writer.write_record(&header).map_err(io_err)?;

    for (row, prediction) in rows.iter().zip(predictions) {
        let mut record: Vec<String> = row.values().iter().map(|v| v.to_string()).collect();
        record.push(prediction.label.as_u8().to_string());
        writer.write_record(&record).map_err(io_err)?;
    }

    writer
        .flush()
        .map_err(|e| PipelineError::StorageFailure(format!("cannot flush {}: {}", path.display(), e)))?;
    log::info!("Predictions saved to {}", path.display());
    Ok(())
}
