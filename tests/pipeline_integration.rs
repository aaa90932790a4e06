//! Batch processor behavior over fake embedding and upload collaborators

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

use vecload::embedding::{EmbeddingError, EmbeddingProvider};
use vecload::index::{Document, IndexError};
use vecload::pipeline::{
    load_checkpoint, BatchProcessor, DocumentSink, FieldMapping, ProcessorOptions, MAX_ERROR_LEN,
};
use vecload::source::{Row, RowStatus, RowTable};

/// Embedder that records every input and fails a configurable number of
/// times per text.
struct FakeEmbedder {
    calls: Mutex<Vec<String>>,
    failures_left: Mutex<HashMap<String, usize>>,
    dimension: usize,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures_left: Mutex::new(HashMap::new()),
            dimension: 4,
        }
    }

    fn failing_on(mut self, text: &str, times: usize) -> Self {
        self.failures_left
            .get_mut()
            .unwrap()
            .insert(text.to_string(), times);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl EmbeddingProvider for FakeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().unwrap().push(text.to_string());

        let mut failures = self.failures_left.lock().unwrap();
        if let Some(remaining) = failures.get_mut(text) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EmbeddingError::Request("connection reset".to_string()));
            }
        }

        Ok(vec![0.5; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Sink that records uploads and rejects configured document keys
struct FakeSink {
    uploads: Mutex<Vec<Document>>,
    reject_ids: HashSet<String>,
    rejection_detail: String,
}

impl FakeSink {
    fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            reject_ids: HashSet::new(),
            rejection_detail: "document key is invalid".to_string(),
        }
    }

    fn rejecting(mut self, id: &str) -> Self {
        self.reject_ids.insert(id.to_string());
        self
    }

    fn with_rejection_detail(mut self, detail: &str) -> Self {
        self.rejection_detail = detail.to_string();
        self
    }

    fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    fn uploaded_ids(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|doc| doc["contract_item_id"].as_str().unwrap_or("").to_string())
            .collect()
    }
}

impl DocumentSink for FakeSink {
    fn upload(&self, documents: &[Document]) -> Result<(), IndexError> {
        assert_eq!(documents.len(), 1, "processor uploads one document at a time");
        let document = documents[0].clone();
        let id = document["contract_item_id"].as_str().unwrap_or("");

        if self.reject_ids.contains(id) {
            return Err(IndexError::Rejected {
                operation: "upload documents",
                status: 400,
                detail: self.rejection_detail.clone(),
            });
        }

        self.uploads.lock().unwrap().push(document);
        Ok(())
    }
}

fn table_of(ids: &[&str]) -> RowTable {
    let rows = ids
        .iter()
        .map(|id| {
            let fields: BTreeMap<String, Value> = [
                ("Id".to_string(), json!(id)),
                ("ShortText".to_string(), json!(format!("item {}", id))),
                ("NetUnitPrice".to_string(), json!(9.5)),
            ]
            .into_iter()
            .collect();
            Row::new(fields)
        })
        .collect();
    RowTable::new(rows)
}

fn mapping() -> FieldMapping {
    FieldMapping::new(
        "Id",
        &[
            ("Id", "contract_item_id"),
            ("ShortText", "item_text"),
            ("NetUnitPrice", "unit_price"),
        ],
        "ShortText",
        "embedding",
    )
}

fn fast_options(batch_size: usize) -> ProcessorOptions {
    ProcessorOptions {
        batch_size,
        checkpoint_every: 100,
        checkpoint_path: None,
        sleep_between_requests: Duration::ZERO,
        sleep_between_batches: Duration::ZERO,
    }
}

#[test]
fn all_rows_succeed_and_documents_carry_the_embedding() {
    let embedder = FakeEmbedder::new();
    let sink = FakeSink::new();
    let mut table = table_of(&["A-1", "A-2", "A-3"]);

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(10));
    let outcome = processor.process_batch(&mut table).unwrap();

    assert_eq!(outcome.success, 3);
    assert_eq!(outcome.failed, 0);
    assert_eq!(sink.uploaded_ids(), vec!["A-1", "A-2", "A-3"]);

    let uploads = sink.uploads.lock().unwrap();
    let doc = &uploads[0];
    assert_eq!(doc["item_text"], "item A-1");
    assert_eq!(doc["unit_price"], 9.5);
    assert_eq!(doc["embedding"].as_array().unwrap().len(), 4);
}

#[test]
fn successful_rows_are_never_reprocessed() {
    let mut table = table_of(&["A-1", "A-2", "A-3"]);

    let first_embedder = FakeEmbedder::new();
    let first_sink = FakeSink::new();
    let processor = BatchProcessor::new(&first_embedder, &first_sink, mapping(), fast_options(10));
    processor.process_batch(&mut table).unwrap();
    assert_eq!(first_embedder.call_count(), 3);

    // A second pass over the same table touches nothing.
    let second_embedder = FakeEmbedder::new();
    let second_sink = FakeSink::new();
    let processor =
        BatchProcessor::new(&second_embedder, &second_sink, mapping(), fast_options(10));
    let outcome = processor.process_batch(&mut table).unwrap();

    assert_eq!(outcome.success, 0);
    assert_eq!(outcome.failed, 0);
    assert_eq!(second_embedder.call_count(), 0);
    assert_eq!(second_sink.upload_count(), 0);
}

#[test]
fn processed_at_is_set_exactly_for_processed_rows() {
    let embedder = FakeEmbedder::new();
    let sink = FakeSink::new();
    let mut table = table_of(&["A-1", "A-2", "A-3", "A-4"]);

    // Batch size smaller than the table: only the first two rows run.
    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(2));
    processor.process_batch(&mut table).unwrap();

    for row in &table.rows[..2] {
        assert_eq!(row.status, RowStatus::Success);
        assert!(row.processed_at.is_some());
    }
    for row in &table.rows[2..] {
        assert_eq!(row.status, RowStatus::Pending);
        assert!(row.processed_at.is_none());
    }
}

#[test]
fn embedding_failure_does_not_block_the_batch() {
    let embedder = FakeEmbedder::new().failing_on("item A-3", usize::MAX);
    let sink = FakeSink::new();
    let mut table = table_of(&["A-1", "A-2", "A-3", "A-4", "A-5"]);

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(10));
    let outcome = processor.process_batch(&mut table).unwrap();

    assert_eq!(outcome.success, 4);
    assert_eq!(outcome.failed, 1);

    let failed = &table.rows[2];
    assert_eq!(failed.status, RowStatus::Failed);
    assert!(!failed.error.is_empty());
    assert!(failed.error.contains("embedding generation failed"));
    assert!(failed.processed_at.is_some());

    // No upload was attempted for the failed row.
    assert_eq!(sink.uploaded_ids(), vec!["A-1", "A-2", "A-4", "A-5"]);
}

#[test]
fn upload_rejection_is_captured_without_reembedding() {
    let embedder = FakeEmbedder::new();
    let sink = FakeSink::new().rejecting("A-2");
    let mut table = table_of(&["A-1", "A-2", "A-3"]);

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(10));
    let outcome = processor.process_batch(&mut table).unwrap();

    assert_eq!(outcome.success, 2);
    assert_eq!(outcome.failed, 1);

    let failed = &table.rows[1];
    assert_eq!(failed.status, RowStatus::Failed);
    assert!(failed.error.contains("document key is invalid"));

    // One embedding per selected row: the rejection did not trigger a
    // second embedding attempt.
    assert_eq!(
        embedder.calls(),
        vec!["item A-1", "item A-2", "item A-3"]
    );
}

#[test]
fn stored_errors_are_truncated_to_the_cap() {
    let detail = "x".repeat(MAX_ERROR_LEN + 500);
    let embedder = FakeEmbedder::new();
    let sink = FakeSink::new()
        .rejecting("A-1")
        .with_rejection_detail(&detail);
    let mut table = table_of(&["A-1"]);

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(10));
    processor.process_batch(&mut table).unwrap();

    let error = &table.rows[0].error;
    assert_eq!(error.chars().count(), MAX_ERROR_LEN);
}

#[test]
fn batch_selection_takes_first_pending_rows_in_table_order() {
    let embedder = FakeEmbedder::new();
    let sink = FakeSink::new();
    let mut table = table_of(&[
        "A-0", "A-1", "A-2", "A-3", "A-4", "A-5", "A-6", "A-7", "A-8", "A-9",
    ]);
    for index in [1, 4, 7] {
        table.rows[index].status = RowStatus::Success;
    }

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(5));
    let outcome = processor.process_batch(&mut table).unwrap();

    assert_eq!(outcome.success, 5);
    // The first five non-successful rows, in original table order.
    assert_eq!(
        sink.uploaded_ids(),
        vec!["A-0", "A-2", "A-3", "A-5", "A-6"]
    );
    // Rows beyond the batch are untouched.
    assert_eq!(table.rows[8].status, RowStatus::Pending);
    assert_eq!(table.rows[9].status, RowStatus::Pending);
}

#[test]
fn failed_rows_are_retried_on_later_passes() {
    // First attempt on A-2 fails, the retry succeeds.
    let embedder = FakeEmbedder::new().failing_on("item A-2", 1);
    let sink = FakeSink::new();
    let mut table = table_of(&["A-1", "A-2", "A-3"]);

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), fast_options(10));
    processor.run(&mut table).unwrap();

    assert_eq!(table.remaining(), 0);
    assert_eq!(table.summary().success, 3);
    // A-2 was embedded twice: once failing, once succeeding.
    assert_eq!(
        embedder
            .calls()
            .iter()
            .filter(|text| text.as_str() == "item A-2")
            .count(),
        2
    );
}

#[test]
fn checkpoint_resume_skips_completed_rows() {
    let dir = tempfile::TempDir::new().unwrap();
    let checkpoint_path = dir.path().join("checkpoint.json");

    let mut options = fast_options(10);
    options.checkpoint_path = Some(checkpoint_path.clone());

    // First run: one row fails persistently.
    let embedder = FakeEmbedder::new().failing_on("item A-2", usize::MAX);
    let sink = FakeSink::new();
    let mut table = table_of(&["A-1", "A-2", "A-3"]);
    let processor = BatchProcessor::new(&embedder, &sink, mapping(), options.clone());
    processor.process_batch(&mut table).unwrap();

    // Reload from disk, as a fresh process would.
    let mut resumed = load_checkpoint(&checkpoint_path).unwrap().unwrap();
    assert_eq!(resumed, table);
    assert_eq!(resumed.remaining(), 1);

    // Second run only touches the failed row.
    let embedder = FakeEmbedder::new();
    let sink = FakeSink::new();
    let processor = BatchProcessor::new(&embedder, &sink, mapping(), options);
    let outcome = processor.process_batch(&mut resumed).unwrap();

    assert_eq!(outcome.success, 1);
    assert_eq!(embedder.calls(), vec!["item A-2"]);
    assert_eq!(resumed.remaining(), 0);

    // The error is cleared once the retry succeeds.
    assert_eq!(resumed.rows[1].error, "");
}

#[test]
fn checkpoint_is_saved_at_the_configured_interval() {
    let dir = tempfile::TempDir::new().unwrap();
    let checkpoint_path = dir.path().join("checkpoint.json");

    let mut options = fast_options(10);
    options.checkpoint_path = Some(checkpoint_path.clone());
    options.checkpoint_every = 2;

    let embedder = FakeEmbedder::new();
    // Rejecting the third row makes the post-row state observable: if the
    // interval save ran after row two, the snapshot must exist even though
    // later rows still fail.
    let sink = FakeSink::new().rejecting("A-3");
    let mut table = table_of(&["A-1", "A-2", "A-3"]);

    let processor = BatchProcessor::new(&embedder, &sink, mapping(), options);
    processor.process_batch(&mut table).unwrap();

    let saved = load_checkpoint(&checkpoint_path).unwrap().unwrap();
    assert_eq!(saved.summary().success, 2);
    assert_eq!(saved.summary().failed, 1);
}
