//! CSV file source

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use super::{Row, RowTable, SourceError, TabularSource};

/// Loads rows from a delimited flat file with header row
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TabularSource for CsvSource {
    fn load(&self) -> Result<RowTable, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::FileNotFound {
                path: self.path.clone(),
            });
        }

        tracing::info!(path = %self.path.display(), "loading CSV");

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let fields: BTreeMap<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(header, raw)| (header.to_string(), infer_scalar(raw)))
                .collect();
            rows.push(Row::new(fields));
        }

        tracing::info!(rows = rows.len(), "CSV loaded");
        Ok(RowTable::new(rows))
    }
}

/// Interpret a CSV cell as the narrowest matching scalar: integer, float,
/// string; empty cells become null.
fn infer_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = raw.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}
