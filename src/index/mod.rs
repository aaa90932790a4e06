//! Azure AI Search index client
//!
//! Index lifecycle management (create/delete/describe/stats), document
//! upload, and the three retrieval modes (keyword, vector, hybrid). Each
//! operation is a single blocking request/response with no retry or
//! backoff built in; retries, if any, are the caller's responsibility.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::SearchConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};

mod schema;

pub use schema::{
    ExhaustiveKnnParameters, FieldDefinition, FieldType, HnswParameters, IndexSchema,
    SimilarityMetric, VectorSearchAlgorithm, VectorSearchConfig, VectorSearchProfile,
};

/// The upload unit: one index document as a JSON object
pub type Document = serde_json::Map<String, Value>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Client initialization failed: {0}")]
    Initialization(String),

    #[error("Search service request failed: {0}")]
    Request(String),

    #[error("{operation} rejected: HTTP {status}: {detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("Malformed search service response: {0}")]
    MalformedResponse(String),

    /// Vector and hybrid search embed the query text first
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Options for the hybrid (lexical + vector) search leg fusion
#[derive(Debug, Clone)]
pub struct HybridSearchOptions {
    /// Vector candidates retrieved before reciprocal rank fusion
    pub k_vector: usize,
    /// Name of the vector field in the index
    pub vector_field: String,
    /// Text fields searched by the lexical leg
    pub search_fields: Option<Vec<String>>,
    /// Comma-separated list of fields to return
    pub select: Option<String>,
    /// OData filter expression, passed through verbatim
    pub filter: Option<String>,
    pub query_type: QueryType,
    pub search_mode: SearchMode,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            k_vector: 200,
            vector_field: "embedding".to_string(),
            search_fields: None,
            select: None,
            filter: None,
            query_type: QueryType::Simple,
            search_mode: SearchMode::Any,
        }
    }
}

/// Lexical query syntax mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Simple,
    Full,
}

impl QueryType {
    fn as_str(&self) -> &'static str {
        match self {
            QueryType::Simple => "simple",
            QueryType::Full => "full",
        }
    }
}

/// Term match mode for the lexical leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Any,
    All,
}

impl SearchMode {
    fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Any => "any",
            SearchMode::All => "all",
        }
    }
}

/// Ranked result set returned by all three search modes
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "@odata.count")]
    pub count: Option<i64>,
    #[serde(default)]
    pub value: Vec<SearchHit>,
}

/// One ranked hit with its relevance score and returned fields
#[derive(Debug, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "@search.score")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// Index statistics (document count, storage size)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IndexStats {
    #[serde(rename = "documentCount")]
    pub document_count: u64,
    #[serde(rename = "storageSize")]
    pub storage_size: u64,
}

/// Client for one Azure AI Search index
pub struct SearchIndexClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    index_name: String,
    api_version: String,
    api_key: String,
}

impl SearchIndexClient {
    pub fn new(config: &SearchConfig) -> Result<Self, IndexError> {
        Self::from_parts(
            &format!("https://{}.search.windows.net", config.service),
            &config.index_name,
            &config.api_version,
            &config.admin_key,
        )
    }

    /// Build a client against an explicit endpoint URL
    pub fn from_parts(
        endpoint: &str,
        index_name: &str,
        api_version: &str,
        api_key: &str,
    ) -> Result<Self, IndexError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| IndexError::Initialization(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            api_version: api_version.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    fn docs_url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}?api-version={}",
            self.endpoint, self.index_name, operation, self.api_version
        )
    }

    fn stats_url(&self) -> String {
        format!(
            "{}/indexes/{}/stats?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    /// Create the index from a schema definition
    pub fn create(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        let response = self
            .http
            .put(self.index_url())
            .header("api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(schema)
            .send()
            .map_err(|e| IndexError::Request(e.to_string()))?;

        match response.status().as_u16() {
            201 | 204 => Ok(()),
            status => Err(IndexError::Rejected {
                operation: "create index",
                status,
                detail: response.text().unwrap_or_default(),
            }),
        }
    }

    /// Delete the index. "Index not found" counts as success.
    pub fn delete(&self) -> Result<(), IndexError> {
        let response = self
            .http
            .delete(self.index_url())
            .header("api-key", &self.api_key)
            .send()
            .map_err(|e| IndexError::Request(e.to_string()))?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            404 => {
                tracing::info!(index = %self.index_name, "index not found, nothing to delete");
                Ok(())
            }
            status => Err(IndexError::Rejected {
                operation: "delete index",
                status,
                detail: response.text().unwrap_or_default(),
            }),
        }
    }

    /// Fetch the index definition
    pub fn describe(&self) -> Result<Value, IndexError> {
        let response = self
            .http
            .get(self.index_url())
            .header("api-key", &self.api_key)
            .send()
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Rejected {
                operation: "describe index",
                status: status.as_u16(),
                detail: response.text().unwrap_or_default(),
            });
        }

        response
            .json()
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))
    }

    /// Fetch index statistics
    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let response = self
            .http
            .get(self.stats_url())
            .header("api-key", &self.api_key)
            .send()
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Rejected {
                operation: "index stats",
                status: status.as_u16(),
                detail: response.text().unwrap_or_default(),
            });
        }

        response
            .json()
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))
    }

    /// Upload a batch of documents. Each document is tagged with the
    /// merge-or-upload action before transmission.
    pub fn upload_documents(&self, documents: &[Document]) -> Result<(), IndexError> {
        let tagged: Vec<Value> = documents
            .iter()
            .map(|doc| {
                let mut doc = doc.clone();
                doc.insert(
                    "@search.action".to_string(),
                    Value::String("mergeOrUpload".to_string()),
                );
                Value::Object(doc)
            })
            .collect();

        let response = self
            .http
            .post(self.docs_url("index"))
            .header("api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&json!({ "value": tagged }))
            .send()
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Rejected {
                operation: "upload documents",
                status: status.as_u16(),
                detail: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Keyword search using lexical (BM25) relevance scoring
    pub fn text_search(
        &self,
        query: &str,
        top: usize,
        select: Option<&str>,
    ) -> Result<SearchResponse, IndexError> {
        self.search(&text_search_body(query, top, select), "text search")
    }

    /// Nearest-neighbor search over the vector field. The query text is
    /// embedded first via the given provider.
    pub fn vector_search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        top: usize,
        vector_field: &str,
        select: Option<&str>,
    ) -> Result<SearchResponse, IndexError> {
        let embedding = embedder.embed(query)?;
        self.search(
            &vector_search_body(&embedding, top, vector_field, select),
            "vector search",
        )
    }

    /// Hybrid search: one request carrying both a lexical query and a
    /// vector query leg, fused server-side with reciprocal rank fusion.
    pub fn hybrid_search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        top: usize,
        options: &HybridSearchOptions,
    ) -> Result<SearchResponse, IndexError> {
        let embedding = embedder.embed(query)?;
        self.search(
            &hybrid_search_body(query, &embedding, top, options),
            "hybrid search",
        )
    }

    fn search(&self, body: &Value, operation: &'static str) -> Result<SearchResponse, IndexError> {
        let response = self
            .http
            .post(self.docs_url("search"))
            .header("api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Rejected {
                operation,
                status: status.as_u16(),
                detail: response.text().unwrap_or_default(),
            });
        }

        response
            .json()
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))
    }
}

fn text_search_body(query: &str, top: usize, select: Option<&str>) -> Value {
    let mut body = json!({
        "search": query,
        "top": top,
    });
    if let Some(select) = select {
        body["select"] = Value::String(select.to_string());
    }
    body
}

fn vector_search_body(
    embedding: &[f32],
    top: usize,
    vector_field: &str,
    select: Option<&str>,
) -> Value {
    let mut body = json!({
        "vectorQueries": [{
            "kind": "vector",
            "vector": embedding,
            "k": top,
            "fields": vector_field,
        }],
    });
    if let Some(select) = select {
        body["select"] = Value::String(select.to_string());
    }
    body
}

fn hybrid_search_body(
    query: &str,
    embedding: &[f32],
    top: usize,
    options: &HybridSearchOptions,
) -> Value {
    let mut body = json!({
        // lexical leg
        "search": query,
        "queryType": options.query_type.as_str(),
        "searchMode": options.search_mode.as_str(),
        // vector leg
        "vectorQueries": [{
            "kind": "vector",
            "fields": options.vector_field,
            "vector": embedding,
            "k": options.k_vector,
        }],
        // result shaping
        "top": top,
        "count": true,
    });
    if let Some(fields) = &options.search_fields {
        body["searchFields"] = Value::String(fields.join(","));
    }
    if let Some(select) = &options.select {
        body["select"] = Value::String(select.clone());
    }
    if let Some(filter) = &options.filter {
        body["filter"] = Value::String(filter.clone());
    }
    body
}
