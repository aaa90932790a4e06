//! Checkpointed batch processing
//!
//! The core of the pipeline: drive the per-row embed, document assembly,
//! and upload sequence over every row that is not yet successful, in
//! bounded batches, with durable resumable checkpoints. Execution is
//! strictly sequential: one outbound call at a time, a fixed delay after
//! every row.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::{Document, IndexError, SearchIndexClient};
use crate::source::{Row, RowStatus, RowTable};

mod checkpoint;

pub use checkpoint::{load_checkpoint, save_checkpoint};

/// Stored per-row error messages are capped at this many characters so a
/// repeatedly failing row cannot grow the checkpoint without bound.
pub const MAX_ERROR_LEN: usize = 2000;

/// Destination for assembled documents. `SearchIndexClient` is the
/// production implementation; tests substitute recording fakes.
pub trait DocumentSink {
    fn upload(&self, documents: &[Document]) -> std::result::Result<(), IndexError>;
}

impl DocumentSink for SearchIndexClient {
    fn upload(&self, documents: &[Document]) -> std::result::Result<(), IndexError> {
        self.upload_documents(documents)
    }
}

/// Maps source columns onto index fields and names the special columns
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// Source column holding the record identifier (used for logging)
    pub id_column: String,
    /// (source column, index field) rename pairs
    pub renames: Vec<(String, String)>,
    /// Source column whose text is embedded
    pub text_column: String,
    /// Index field receiving the embedding vector
    pub vector_field: String,
}

impl FieldMapping {
    pub fn new(
        id_column: &str,
        renames: &[(&str, &str)],
        text_column: &str,
        vector_field: &str,
    ) -> Self {
        Self {
            id_column: id_column.to_string(),
            renames: renames
                .iter()
                .map(|(source, target)| (source.to_string(), target.to_string()))
                .collect(),
            text_column: text_column.to_string(),
            vector_field: vector_field.to_string(),
        }
    }
}

/// Batch processing knobs
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Rows selected per batch
    pub batch_size: usize,
    /// Save the checkpoint after every this many processed rows
    pub checkpoint_every: usize,
    /// Checkpoint location; `None` disables persistence
    pub checkpoint_path: Option<PathBuf>,
    /// Delay after every row, regardless of outcome
    pub sleep_between_requests: Duration,
    /// Delay between batches while rows remain
    pub sleep_between_batches: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            checkpoint_every: 250,
            checkpoint_path: None,
            sleep_between_requests: Duration::from_millis(250),
            sleep_between_batches: Duration::from_secs(5),
        }
    }
}

/// Counts for one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
}

/// Drives the embed, assemble, upload sequence with per-row status
/// tracking. Holds no row state itself: the table plus its checkpoint are
/// the single source of truth, so a crashed run resumes by reloading the
/// checkpoint.
pub struct BatchProcessor<'a> {
    embedder: &'a dyn EmbeddingProvider,
    sink: &'a dyn DocumentSink,
    mapping: FieldMapping,
    options: ProcessorOptions,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingProvider,
        sink: &'a dyn DocumentSink,
        mapping: FieldMapping,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            embedder,
            sink,
            mapping,
            options,
        }
    }

    /// Process batches until every row is successful. Rows that fail are
    /// retried on the next pass; there is no retry cutoff, so a run over
    /// persistently bad rows only ends when the operator intervenes.
    pub fn run(&self, table: &mut RowTable) -> Result<()> {
        let mut batch_number = 1u64;
        loop {
            let remaining = table.remaining();
            if remaining == 0 {
                tracing::info!("all rows processed");
                return Ok(());
            }

            tracing::info!(batch = batch_number, remaining, "starting batch");
            let outcome = self.process_batch(table)?;
            tracing::info!(
                batch = batch_number,
                success = outcome.success,
                failed = outcome.failed,
                "batch complete"
            );
            batch_number += 1;

            if table.remaining() > 0 {
                tracing::info!(
                    seconds = self.options.sleep_between_batches.as_secs_f64(),
                    "sleeping before next batch"
                );
                thread::sleep(self.options.sleep_between_batches);
            }
        }
    }

    /// Process one batch: the first `batch_size` rows that are not yet
    /// successful, in table order. Returns the per-batch outcome counts.
    pub fn process_batch(&self, table: &mut RowTable) -> Result<BatchOutcome> {
        let selected: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status != RowStatus::Success)
            .map(|(index, _)| index)
            .take(self.options.batch_size)
            .collect();

        let mut outcome = BatchOutcome::default();
        if selected.is_empty() {
            return Ok(outcome);
        }

        let total = selected.len();
        let mut processed = 0usize;

        for (position, index) in selected.into_iter().enumerate() {
            let row = &mut table.rows[index];
            let row_id = display_id(row, &self.mapping.id_column, index);
            tracing::debug!(row = position + 1, total, id = %row_id, "processing row");

            if self.process_row(row) {
                outcome.success += 1;
            } else {
                let row = &table.rows[index];
                tracing::warn!(id = %row_id, error = %row.error, "row failed");
                outcome.failed += 1;
            }

            processed += 1;
            if let Some(path) = &self.options.checkpoint_path {
                if processed % self.options.checkpoint_every == 0 {
                    save_checkpoint(table, path)?;
                    tracing::info!(processed, "checkpoint saved");
                }
            }

            // Rate limit, applied after every row regardless of outcome
            thread::sleep(self.options.sleep_between_requests);
        }

        if let Some(path) = &self.options.checkpoint_path {
            save_checkpoint(table, path)?;
        }

        Ok(outcome)
    }

    /// One row: embed, assemble, upload. Returns whether the row succeeded;
    /// tracking fields are updated either way. Failures never propagate.
    fn process_row(&self, row: &mut Row) -> bool {
        let text = row
            .get(&self.mapping.text_column)
            .map(value_to_text)
            .unwrap_or_default();

        let embedding = match self.embedder.embed(&text) {
            Ok(embedding) => embedding,
            Err(e) => {
                mark_failed(row, &format!("embedding generation failed: {}", e));
                return false;
            }
        };

        let document = self.build_document(row, &embedding);

        match self.sink.upload(&[document]) {
            Ok(()) => {
                row.status = RowStatus::Success;
                row.error.clear();
                row.processed_at = Some(Utc::now());
                true
            }
            Err(e) => {
                mark_failed(row, &e.to_string());
                false
            }
        }
    }

    /// Assemble the upload document: renamed source fields plus the
    /// embedding vector. Columns absent from the row are skipped; null
    /// values pass through.
    fn build_document(&self, row: &Row, embedding: &[f32]) -> Document {
        let mut document = Document::new();
        for (source, target) in &self.mapping.renames {
            if let Some(value) = row.get(source) {
                document.insert(target.clone(), value.clone());
            }
        }
        document.insert(
            self.mapping.vector_field.clone(),
            Value::from(embedding.to_vec()),
        );
        document
    }
}

fn mark_failed(row: &mut Row, message: &str) {
    row.status = RowStatus::Failed;
    row.error = truncate_error(message);
    row.processed_at = Some(Utc::now());
}

fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn display_id(row: &Row, id_column: &str, index: usize) -> String {
    match row.get(id_column) {
        Some(Value::String(id)) => id.clone(),
        Some(value) if !value.is_null() => value.to_string(),
        _ => format!("row_{}", index),
    }
}
