use std::time::Duration;

use serde_json::Value;

use vecload::cli::{Cli, Commands};
use vecload::config::{Config, DataSourceKind};
use vecload::embedding::{RemoteEmbeddingProvider, EMBEDDING_DIMENSIONS};
use vecload::index::{
    FieldDefinition, FieldType, HnswParameters, HybridSearchOptions, IndexSchema,
    SearchIndexClient, SearchResponse, SimilarityMetric, VectorSearchAlgorithm,
    VectorSearchConfig, VectorSearchProfile, ExhaustiveKnnParameters,
};
use vecload::pipeline::{load_checkpoint, BatchProcessor, FieldMapping, ProcessorOptions};
use vecload::source::{CelonisSource, CsvSource, PqlColumn, RowTable, TabularSource};
use vecload::{Result, VecloadError};

/// Source column to index field renames
const FIELD_RENAMES: &[(&str, &str)] = &[
    ("Id", "contract_item_id"),
    ("SystemContractNumber", "contract_number"),
    ("SystemContractItemNumber", "contract_item_number"),
    ("ShortText", "item_text"),
    ("Name", "vendor_name"),
    ("NetUnitPrice", "unit_price"),
    ("Currency", "currency"),
    ("ValidityPeriodStartDate", "contract_start"),
    ("ValidityPeriodEndDate", "contract_end"),
];

/// Source column holding the record identifier
const ID_COLUMN: &str = "Id";

/// Source column whose text is embedded
const TEXT_COLUMN_TO_EMBED: &str = "ShortText";

/// Columns normalized to the service datetime profile before upload
const DATETIME_COLUMNS: &[&str] = &["ValidityPeriodStartDate", "ValidityPeriodEndDate"];

/// Index field receiving the embedding vector
const VECTOR_FIELD: &str = "embedding";

/// Save the checkpoint after every this many processed rows
const CHECKPOINT_EVERY: usize = 250;

/// Text fields searched by the lexical leg of hybrid queries
const HYBRID_SEARCH_FIELDS: &[&str] = &["item_text", "vendor_name", "contract_number"];

/// PQL columns used when extracting from Celonis (`--source celonis`).
/// Column names must match the FIELD_RENAMES keys above.
fn celonis_columns() -> Vec<PqlColumn> {
    [
        ("Id", r#""o_celonis_ContractItem"."ID""#),
        (
            "SystemContractNumber",
            r#""o_celonis_ContractItem"."SystemContractNumber""#,
        ),
        (
            "SystemContractItemNumber",
            r#""o_celonis_ContractItem"."SystemContractItemNumber""#,
        ),
        ("ShortText", r#""o_celonis_ContractItem"."ShortText""#),
        ("Name", r#""o_celonis_ContractItem"."Name""#),
        ("NetUnitPrice", r#""o_celonis_ContractItem"."NetUnitPrice""#),
        ("Currency", r#""o_celonis_ContractItem"."Currency""#),
        (
            "ValidityPeriodStartDate",
            r#""o_celonis_ContractItem"."ValidityPeriodStartDate""#,
        ),
        (
            "ValidityPeriodEndDate",
            r#""o_celonis_ContractItem"."ValidityPeriodEndDate""#,
        ),
    ]
    .into_iter()
    .map(|(name, query)| PqlColumn::new(name, query))
    .collect()
}

/// Index schema for contract items: typed fields plus the embedding
/// vector bound to an HNSW profile with an exhaustive fallback.
fn contract_items_schema(index_name: &str) -> IndexSchema {
    IndexSchema {
        name: index_name.to_string(),
        fields: vec![
            FieldDefinition::new("contract_item_id", FieldType::String)
                .key()
                .filterable(),
            FieldDefinition::new("contract_number", FieldType::String)
                .filterable()
                .searchable(),
            FieldDefinition::new("contract_item_number", FieldType::Int32).filterable(),
            FieldDefinition::new("item_text", FieldType::String).searchable(),
            FieldDefinition::new("vendor_name", FieldType::String)
                .filterable()
                .searchable(),
            FieldDefinition::new("unit_price", FieldType::Double)
                .filterable()
                .sortable(),
            FieldDefinition::new("currency", FieldType::String).filterable(),
            FieldDefinition::new("contract_start", FieldType::DateTimeOffset)
                .filterable()
                .sortable(),
            FieldDefinition::new("contract_end", FieldType::DateTimeOffset)
                .filterable()
                .sortable(),
            FieldDefinition::new(VECTOR_FIELD, FieldType::SingleCollection)
                .searchable()
                .retrievable()
                .vector(EMBEDDING_DIMENSIONS, "myHnswProfile"),
        ],
        vector_search: VectorSearchConfig {
            algorithms: vec![
                VectorSearchAlgorithm::Hnsw {
                    name: "myHnsw".to_string(),
                    parameters: HnswParameters {
                        metric: SimilarityMetric::Cosine,
                        m: 12,
                        ef_construction: 400,
                        ef_search: 100,
                    },
                },
                VectorSearchAlgorithm::ExhaustiveKnn {
                    name: "myExhaustive".to_string(),
                    parameters: ExhaustiveKnnParameters {
                        metric: SimilarityMetric::Cosine,
                    },
                },
            ],
            profiles: vec![
                VectorSearchProfile {
                    name: "myHnswProfile".to_string(),
                    algorithm: "myHnsw".to_string(),
                },
                VectorSearchProfile {
                    name: "myExhaustiveProfile".to_string(),
                    algorithm: "myExhaustive".to_string(),
                },
            ],
        },
    }
}

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "vecload=debug" } else { "vecload=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: Cli) -> Result<()> {
    // Fail fast: the required configuration subset is validated before any
    // command runs.
    let config = Config::from_env()?;
    tracing::debug!(config = ?config.to_debug_map(), "configuration loaded");

    match cli.command {
        Commands::CreateIndex { delete_existing } => cmd_create_index(&config, delete_existing),
        Commands::EmbedAndUpload {
            batch_size,
            resume,
            max_rows,
            source,
        } => cmd_embed_and_upload(&config, batch_size, resume, max_rows, source),
        Commands::Search {
            query,
            mode,
            top,
            fields,
        } => cmd_search(&config, &query, &mode, top, fields),
        Commands::Stats => cmd_stats(&config),
    }
}

fn cmd_create_index(config: &Config, delete_existing: bool) -> Result<()> {
    let client = SearchIndexClient::new(&config.search)?;

    println!(
        "Creating index '{}' on service '{}'",
        config.search.index_name, config.search.service
    );

    if delete_existing {
        println!("Deleting existing index (if present)...");
        client.delete()?;
        println!("✓ Delete completed");
    }

    let schema = contract_items_schema(&config.search.index_name);
    client.create(&schema)?;
    println!("✓ Index '{}' created", config.search.index_name);

    // Read the definition back to confirm
    let definition = client.describe()?;
    if let Some(fields) = definition.get("fields").and_then(Value::as_array) {
        println!("\nFields:");
        for field in fields {
            println!(
                "  - {} ({})",
                field["name"].as_str().unwrap_or("?"),
                field["type"].as_str().unwrap_or("?")
            );
        }
    }

    Ok(())
}

fn cmd_embed_and_upload(
    config: &Config,
    batch_size: Option<usize>,
    resume: bool,
    max_rows: Option<usize>,
    source: Option<String>,
) -> Result<()> {
    let source_kind: DataSourceKind = match source {
        Some(raw) => raw.parse().map_err(VecloadError::Config)?,
        None => config.source.data_source,
    };
    let batch_size = batch_size.unwrap_or(config.pipeline.batch_size);
    if batch_size == 0 {
        return Err(VecloadError::Config(
            "--batch-size must be at least 1".to_string(),
        ));
    }

    println!("Embedding pipeline");
    println!("  Index: {}", config.search.index_name);
    println!("  Source: {}", source_kind);
    println!("  Batch size: {}", batch_size);

    // Load the table: checkpoint when resuming, otherwise the source
    let checkpoint_path = &config.source.checkpoint_file_path;
    let mut table = if resume {
        match load_checkpoint(checkpoint_path)? {
            Some(table) => {
                println!("✓ Resumed from checkpoint ({} rows)", table.len());
                table
            }
            None => {
                println!("No checkpoint found, loading from source");
                load_source(config, source_kind, max_rows)?
            }
        }
    } else {
        load_source(config, source_kind, max_rows)?
    };

    if let Some(max) = max_rows {
        println!("Test mode: limiting to first {} rows", max);
        table.truncate(max);
    }

    // Normalize datetime columns for the index; idempotent on resumed
    // checkpoints.
    for column in DATETIME_COLUMNS {
        table.normalize_datetime_column(column);
    }

    println!("Progress: {}", table.summary());

    let embedder = RemoteEmbeddingProvider::new(&config.embedding, EMBEDDING_DIMENSIONS)?;
    let client = SearchIndexClient::new(&config.search)?;
    let mapping = FieldMapping::new(ID_COLUMN, FIELD_RENAMES, TEXT_COLUMN_TO_EMBED, VECTOR_FIELD);
    let options = ProcessorOptions {
        batch_size,
        checkpoint_every: CHECKPOINT_EVERY,
        checkpoint_path: Some(checkpoint_path.clone()),
        sleep_between_requests: Duration::from_secs_f64(config.pipeline.sleep_between_requests),
        sleep_between_batches: Duration::from_secs_f64(config.pipeline.sleep_between_batches),
    };

    let processor = BatchProcessor::new(&embedder, &client, mapping, options);
    processor.run(&mut table)?;

    println!("Progress: {}", table.summary());
    println!("✓ Checkpoint saved to {}", checkpoint_path.display());
    Ok(())
}

fn load_source(
    config: &Config,
    kind: DataSourceKind,
    max_rows: Option<usize>,
) -> Result<RowTable> {
    match kind {
        DataSourceKind::Csv => {
            println!("Loading CSV from {}", config.source.csv_file_path.display());
            Ok(CsvSource::new(&config.source.csv_file_path).load()?)
        }
        DataSourceKind::Celonis => {
            config.validate_celonis()?;
            println!("Loading data from Celonis EMS...");
            let source = CelonisSource::new(&config.celonis, celonis_columns(), max_rows)?;
            Ok(source.load()?)
        }
    }
}

fn cmd_search(
    config: &Config,
    query: &str,
    mode: &str,
    top: usize,
    fields: Option<String>,
) -> Result<()> {
    println!("Index: {}", config.search.index_name);
    println!("Query: {}", query);
    println!("Mode: {}", mode);

    let client = SearchIndexClient::new(&config.search)?;
    let select = fields.as_deref();

    let response = match mode {
        "text" => client.text_search(query, top, select)?,
        "vector" => {
            let embedder = RemoteEmbeddingProvider::new(&config.embedding, EMBEDDING_DIMENSIONS)?;
            client.vector_search(&embedder, query, top, VECTOR_FIELD, select)?
        }
        "hybrid" => {
            let embedder = RemoteEmbeddingProvider::new(&config.embedding, EMBEDDING_DIMENSIONS)?;
            let options = HybridSearchOptions {
                search_fields: Some(
                    HYBRID_SEARCH_FIELDS.iter().map(|f| f.to_string()).collect(),
                ),
                select: fields.clone(),
                ..Default::default()
            };
            client.hybrid_search(&embedder, query, top, &options)?
        }
        other => {
            return Err(VecloadError::Config(format!(
                "unknown search mode: {}",
                other
            )))
        }
    };

    print_results(&response, mode);
    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let client = SearchIndexClient::new(&config.search)?;
    let stats = client.stats()?;

    println!("Index '{}'", config.search.index_name);
    println!("  Documents: {}", stats.document_count);
    println!("  Storage size: {} bytes", stats.storage_size);
    Ok(())
}

fn print_results(response: &SearchResponse, mode: &str) {
    if response.value.is_empty() {
        println!("\nNo results found");
        return;
    }

    let count = response.count.unwrap_or(response.value.len() as i64);
    println!("\nSearch results ({} mode)", mode);
    println!("Total matches: {}", count);
    println!("Showing: {} results\n", response.value.len());

    for (i, hit) in response.value.iter().enumerate() {
        match hit.score {
            Some(score) => println!("Result {} (score: {})", i + 1, score),
            None => println!("Result {}", i + 1),
        }
        for (key, value) in &hit.fields {
            if key.starts_with("@search") {
                continue;
            }
            match value {
                Value::Null => println!("  {}: N/A", key),
                Value::String(text) => println!("  {}: {}", key, text),
                other => println!("  {}: {}", key, other),
            }
        }
        println!();
    }
}
