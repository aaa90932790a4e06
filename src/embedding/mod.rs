//! Remote embedding generation via Azure OpenAI
//!
//! One blocking HTTP request per input string. Every failure mode
//! (transport, non-success status, malformed body, wrong dimensionality)
//! surfaces as an `EmbeddingError` for the caller to handle; nothing in
//! this module aborts the process.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Dimensionality of text-embedding-ada-002 vectors
pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Client initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Embedding request rejected: HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// The batch processor and the vector/hybrid search paths depend on this
/// seam rather than on the concrete HTTP client, so tests can substitute
/// a deterministic implementation.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Fixed dimensionality of the produced vectors
    fn dimension(&self) -> usize;
}

/// Azure OpenAI embedding client
///
/// Posts to `{endpoint}/openai/deployments/{deployment}/embeddings`. When a
/// `Host` header override is configured (IP-pinned endpoint), TLS
/// verification is relaxed for this client only, since the certificate
/// cannot match the literal IP.
pub struct RemoteEmbeddingProvider {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
    host_header: Option<String>,
    dimension: usize,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, dimension: usize) -> Result<Self, EmbeddingError> {
        let mut builder = reqwest::blocking::Client::builder();
        if config.host_header.is_some() {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| EmbeddingError::Initialization(e.to_string()))?;

        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );

        Ok(Self {
            http,
            url,
            api_key: config.key.clone(),
            host_header: config.host_header.clone(),
            dimension,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let mut request = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&json!({ "input": text }));

        if let Some(host) = &self.host_header {
            request = request.header(reqwest::header::HOST, host);
        }

        let response = request
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(EmbeddingError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                EmbeddingError::MalformedResponse("response contained no embeddings".to_string())
            })?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(endpoint: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            endpoint: endpoint.to_string(),
            key: "test-key".to_string(),
            deployment: "ada".to_string(),
            api_version: "2023-05-15".to_string(),
            host_header: None,
        }
    }

    fn embedding_body(dimension: usize) -> String {
        let vector: Vec<f32> = (0..dimension).map(|i| i as f32 * 0.5).collect();
        json!({ "data": [ { "embedding": vector } ] }).to_string()
    }

    #[test]
    fn embeds_via_deployment_url() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/openai/deployments/ada/embeddings?api-version=2023-05-15")
            .match_header("api-key", "test-key")
            .match_body(mockito::Matcher::Json(json!({ "input": "office chair" })))
            .with_status(200)
            .with_body(embedding_body(4))
            .create();

        let provider = RemoteEmbeddingProvider::new(&test_config(&server.url()), 4).unwrap();
        let embedding = provider.embed("office chair").unwrap();

        assert_eq!(embedding.len(), 4);
        assert_eq!(embedding[1], 0.5);
        mock.assert();
    }

    #[test]
    fn non_success_status_is_rejected() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/openai/deployments/ada/embeddings?api-version=2023-05-15")
            .with_status(429)
            .with_body("rate limited")
            .create();

        let provider = RemoteEmbeddingProvider::new(&test_config(&server.url()), 4).unwrap();
        match provider.embed("text") {
            Err(EmbeddingError::Rejected { status, detail }) => {
                assert_eq!(status, 429);
                assert_eq!(detail, "rate limited");
            }
            other => panic!("expected rejection, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn malformed_body_is_an_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/openai/deployments/ada/embeddings?api-version=2023-05-15")
            .with_status(200)
            .with_body("{\"unexpected\": true}")
            .create();

        let provider = RemoteEmbeddingProvider::new(&test_config(&server.url()), 4).unwrap();
        assert!(matches!(
            provider.embed("text"),
            Err(EmbeddingError::MalformedResponse(_))
        ));
    }

    #[test]
    fn empty_data_array_is_an_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/openai/deployments/ada/embeddings?api-version=2023-05-15")
            .with_status(200)
            .with_body(json!({ "data": [] }).to_string())
            .create();

        let provider = RemoteEmbeddingProvider::new(&test_config(&server.url()), 4).unwrap();
        assert!(matches!(
            provider.embed("text"),
            Err(EmbeddingError::MalformedResponse(_))
        ));
    }

    #[test]
    fn wrong_dimensionality_is_an_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/openai/deployments/ada/embeddings?api-version=2023-05-15")
            .with_status(200)
            .with_body(embedding_body(3))
            .create();

        let provider = RemoteEmbeddingProvider::new(&test_config(&server.url()), 4).unwrap();
        assert!(matches!(
            provider.embed("text"),
            Err(EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn empty_input_is_rejected_locally() {
        let server = mockito::Server::new();
        let provider = RemoteEmbeddingProvider::new(&test_config(&server.url()), 4).unwrap();
        assert!(matches!(
            provider.embed(""),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
