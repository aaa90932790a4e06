use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use crate::source::SourceError;

/// Main error type for the vecload pipeline
#[derive(Error, Debug)]
pub enum VecloadError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors (all missing/invalid keys collected)
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Embedding client errors
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Search index client errors
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Data source errors
    #[error(transparent)]
    Source(#[from] SourceError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Environment variable that failed validation
    pub key: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Result type for vecload operations
pub type Result<T> = std::result::Result<T, VecloadError>;
