//! CLI command definitions and parsing
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "vecload",
    version,
    about = "Vector embedding pipeline for Azure AI Search",
    long_about = "Vecload loads tabular records from CSV or Celonis EMS, generates vector \
                  embeddings for a text field via Azure OpenAI, and indexes the documents \
                  into Azure AI Search. Batch runs checkpoint their progress and can be \
                  resumed; the index supports keyword, vector, and hybrid retrieval."
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the search index with vector search capabilities
    CreateIndex {
        /// Delete the index first if it already exists
        #[arg(long)]
        delete_existing: bool,
    },

    /// Embed source rows and upload them to the search index
    EmbedAndUpload {
        /// Rows to process per batch (defaults to BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Resume from the checkpoint file if it exists
        #[arg(long)]
        resume: bool,

        /// Process only the first N rows (for testing)
        #[arg(long)]
        max_rows: Option<usize>,

        /// Data source to read (defaults to DATA_SOURCE)
        #[arg(long, value_parser = ["csv", "celonis"])]
        source: Option<String>,
    },

    /// Search the index using text, vector, or hybrid mode
    Search {
        /// Search query text
        #[arg(long)]
        query: String,

        /// Search mode
        #[arg(long, value_parser = ["text", "vector", "hybrid"], default_value = "hybrid")]
        mode: String,

        /// Number of results to return
        #[arg(long, default_value = "3")]
        top: usize,

        /// Comma-separated list of fields to return (default: all)
        #[arg(long)]
        fields: Option<String>,
    },

    /// Show index statistics (document count, storage size)
    Stats,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
