//! Tabular data sources and the in-memory row table
//!
//! Two interchangeable providers yield the same row shape: a CSV file and
//! a Celonis EMS data model query. Rows carry the per-row processing
//! tracking fields (status, error, processed timestamp) that the batch
//! processor owns and mutates.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod celonis;
mod csv_file;

pub use celonis::{CelonisSource, PqlColumn};
pub use csv_file::CsvSource;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Client initialization failed: {0}")]
    Initialization(String),

    #[error("Celonis request failed: {0}")]
    Request(String),

    #[error("Celonis request rejected: HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Malformed Celonis response: {0}")]
    MalformedResponse(String),

    #[error("Celonis {kind} not found: {selector}")]
    NotFound {
        kind: &'static str,
        selector: String,
    },
}

/// Per-row processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// One source record plus its processing tracking fields
///
/// Source fields are immutable once loaded; the tracking fields are owned
/// and mutated exclusively by the batch processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub status: RowStatus,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Row {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields,
            status: RowStatus::Pending,
            error: String::new(),
            processed_at: None,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// The full in-memory table, preserving source order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowTable {
    pub rows: Vec<Row>,
}

impl RowTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that still need processing (anything not yet successful)
    pub fn remaining(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.status != RowStatus::Success)
            .count()
    }

    /// Keep only the first `max_rows` rows (test runs)
    pub fn truncate(&mut self, max_rows: usize) {
        self.rows.truncate(max_rows);
    }

    pub fn summary(&self) -> ProgressSummary {
        let mut summary = ProgressSummary {
            total: self.len(),
            success: 0,
            failed: 0,
            pending: 0,
        };
        for row in &self.rows {
            match row.status {
                RowStatus::Success => summary.success += 1,
                RowStatus::Failed => summary.failed += 1,
                RowStatus::Pending => summary.pending += 1,
            }
        }
        summary
    }

    /// Normalize one datetime column in place for the search service.
    /// Unparseable values become null rather than failing the load.
    pub fn normalize_datetime_column(&mut self, column: &str) {
        for row in &mut self.rows {
            if let Some(value) = row.fields.get_mut(column) {
                if let Value::String(raw) = value {
                    *value = match normalize_datetime(raw) {
                        Some(normalized) => Value::String(normalized),
                        None => Value::Null,
                    };
                }
            }
        }
    }
}

/// Processing progress counts across the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub pending: usize,
}

impl std::fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} success, {} failed, {} pending ({} total)",
            self.success, self.failed, self.pending, self.total
        )
    }
}

/// A provider of rows. Implementations: CSV files and Celonis data models.
pub trait TabularSource {
    fn load(&self) -> Result<RowTable, SourceError>;
}

/// Normalize a datetime string to the `YYYY-MM-DDTHH:MM:SSZ` profile the
/// search service expects for `Edm.DateTimeOffset` fields.
///
/// Values that already carry an explicit offset are returned unchanged;
/// timezone-naive values are treated as UTC. Returns `None` when the value
/// cannot be interpreted as a datetime.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // An explicit offset (Z or +hh:mm) is kept as-is
    if DateTime::parse_from_rfc3339(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(naive.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }
    }

    None
}
