//! Environment-sourced configuration
//!
//! All settings come from the process environment, optionally seeded from a
//! `.env` file. The required Azure Search and Azure OpenAI settings are
//! validated eagerly at startup; Celonis settings are validated lazily,
//! only when that data source is actually selected.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, ValidationError, VecloadError};

/// Top-level configuration, constructed once at process start and passed
/// by reference into each component constructor.
#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub celonis: CelonisConfig,
}

/// Azure AI Search service settings
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Service name (`https://{service}.search.windows.net`)
    pub service: String,
    pub admin_key: String,
    pub index_name: String,
    pub api_version: String,
}

/// Azure OpenAI embedding endpoint settings
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Full endpoint URL; may be an IP-based URL when combined with `host_header`
    pub endpoint: String,
    pub key: String,
    pub deployment: String,
    pub api_version: String,
    /// Host header override, needed when `endpoint` is an IP address.
    /// Setting this also relaxes TLS verification on the embedding client.
    pub host_header: Option<String>,
}

/// Data source selection and file locations
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub data_source: DataSourceKind,
    pub csv_file_path: PathBuf,
    pub checkpoint_file_path: PathBuf,
}

/// Batch processing knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows per batch
    pub batch_size: usize,
    /// Seconds to sleep after each row (embedding + upload rate limit)
    pub sleep_between_requests: f64,
    /// Seconds to sleep between batches
    pub sleep_between_batches: f64,
}

/// Celonis EMS connection settings (all optional until the source is used)
#[derive(Debug, Clone)]
pub struct CelonisConfig {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub key_type: CelonisKeyType,
    pub data_pool_name: Option<String>,
    pub data_pool_id: Option<String>,
    pub data_model_name: Option<String>,
    pub data_model_id: Option<String>,
}

/// Which tabular source feeds the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Csv,
    Celonis,
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(DataSourceKind::Csv),
            "celonis" => Ok(DataSourceKind::Celonis),
            other => Err(format!("expected 'csv' or 'celonis', got '{}'", other)),
        }
    }
}

impl std::fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSourceKind::Csv => write!(f, "csv"),
            DataSourceKind::Celonis => write!(f, "celonis"),
        }
    }
}

/// Key kind used when authenticating against the Celonis EMS API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelonisKeyType {
    AppKey,
    UserKey,
}

impl FromStr for CelonisKeyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "APP_KEY" => Ok(CelonisKeyType::AppKey),
            "USER_KEY" => Ok(CelonisKeyType::UserKey),
            other => Err(format!("expected 'APP_KEY' or 'USER_KEY', got '{}'", other)),
        }
    }
}

impl Config {
    /// Load configuration from the process environment, seeding it from a
    /// `.env` file in the working directory when one exists.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("loaded environment from {}", path.display()),
            Err(_) => tracing::debug!(".env file not found, using process environment only"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values are
    /// treated the same as unset. All validation failures for the required
    /// subset are collected and reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Option<String> {
            lookup(key).filter(|v| !v.trim().is_empty())
        };

        let mut errors = Vec::new();

        let mut require = |key: &str| -> String {
            match get(key) {
                Some(value) => value,
                None => {
                    errors.push(ValidationError::new(key, "required variable is not set"));
                    String::new()
                }
            }
        };

        let search = SearchConfig {
            service: require("AZURE_SEARCH_SERVICE"),
            admin_key: require("AZURE_SEARCH_ADMIN_KEY"),
            index_name: require("AZURE_SEARCH_INDEX_NAME"),
            api_version: get("AZURE_SEARCH_API_VERSION")
                .unwrap_or_else(|| "2023-10-01-preview".to_string()),
        };

        let embedding = EmbeddingConfig {
            endpoint: require("AZURE_OPENAI_EMBEDDING_ENDPOINT"),
            key: require("AZURE_OPENAI_EMBEDDING_KEY"),
            deployment: require("AZURE_OPENAI_EMBEDDING_DEPLOYMENT"),
            api_version: get("AZURE_OPENAI_EMBEDDING_API_VERSION")
                .unwrap_or_else(|| "2023-05-15".to_string()),
            host_header: get("AZURE_OPENAI_EMBEDDING_HOST_HEADER"),
        };

        fn parse_or<T: FromStr>(
            errors: &mut Vec<ValidationError>,
            key: &str,
            raw: Option<String>,
            default: T,
        ) -> T
        where
            T::Err: std::fmt::Display,
        {
            match raw {
                None => default,
                Some(value) => match value.parse::<T>() {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        errors.push(ValidationError::new(key, e.to_string()));
                        default
                    }
                },
            }
        }

        let source = SourceConfig {
            data_source: parse_or(
                &mut errors,
                "DATA_SOURCE",
                get("DATA_SOURCE"),
                DataSourceKind::Csv,
            ),
            csv_file_path: PathBuf::from(
                get("CSV_FILE_PATH").unwrap_or_else(|| "data/contract_items_reduced.csv".into()),
            ),
            checkpoint_file_path: PathBuf::from(
                get("CHECKPOINT_FILE_PATH").unwrap_or_else(|| "data/checkpoint.json".into()),
            ),
        };

        let pipeline = PipelineConfig {
            batch_size: parse_or(&mut errors, "BATCH_SIZE", get("BATCH_SIZE"), 5000),
            sleep_between_requests: parse_or(
                &mut errors,
                "SLEEP_BETWEEN_REQUESTS",
                get("SLEEP_BETWEEN_REQUESTS"),
                0.25,
            ),
            sleep_between_batches: parse_or(
                &mut errors,
                "SLEEP_BETWEEN_BATCHES",
                get("SLEEP_BETWEEN_BATCHES"),
                5.0,
            ),
        };

        if pipeline.batch_size == 0 {
            errors.push(ValidationError::new("BATCH_SIZE", "must be at least 1"));
        }
        if pipeline.sleep_between_requests < 0.0 || !pipeline.sleep_between_requests.is_finite() {
            errors.push(ValidationError::new(
                "SLEEP_BETWEEN_REQUESTS",
                "must be a non-negative number of seconds",
            ));
        }
        if pipeline.sleep_between_batches < 0.0 || !pipeline.sleep_between_batches.is_finite() {
            errors.push(ValidationError::new(
                "SLEEP_BETWEEN_BATCHES",
                "must be a non-negative number of seconds",
            ));
        }

        let celonis = CelonisConfig {
            base_url: get("CELONIS_BASE_URL"),
            api_token: get("CELONIS_API_TOKEN"),
            key_type: parse_or(
                &mut errors,
                "CELONIS_KEY_TYPE",
                get("CELONIS_KEY_TYPE"),
                CelonisKeyType::AppKey,
            ),
            data_pool_name: get("CELONIS_DATA_POOL_NAME"),
            data_pool_id: get("CELONIS_DATA_POOL_ID"),
            data_model_name: get("CELONIS_DATA_MODEL_NAME"),
            data_model_id: get("CELONIS_DATA_MODEL_ID"),
        };

        if !errors.is_empty() {
            return Err(VecloadError::ConfigValidation { errors });
        }

        Ok(Config {
            search,
            embedding,
            source,
            pipeline,
            celonis,
        })
    }

    /// Validate the Celonis subset. Called on demand when the Celonis
    /// source is selected, never during startup validation.
    pub fn validate_celonis(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.celonis.base_url.is_none() {
            errors.push(ValidationError::new(
                "CELONIS_BASE_URL",
                "required when DATA_SOURCE is 'celonis'",
            ));
        }
        if self.celonis.api_token.is_none() {
            errors.push(ValidationError::new(
                "CELONIS_API_TOKEN",
                "required when DATA_SOURCE is 'celonis'",
            ));
        }
        if self.celonis.data_pool_name.is_none() && self.celonis.data_pool_id.is_none() {
            errors.push(ValidationError::new(
                "CELONIS_DATA_POOL_NAME",
                "set either CELONIS_DATA_POOL_NAME or CELONIS_DATA_POOL_ID",
            ));
        }
        if self.celonis.data_model_name.is_none() && self.celonis.data_model_id.is_none() {
            errors.push(ValidationError::new(
                "CELONIS_DATA_MODEL_NAME",
                "set either CELONIS_DATA_MODEL_NAME or CELONIS_DATA_MODEL_ID",
            ));
        }

        if !errors.is_empty() {
            return Err(VecloadError::ConfigValidation { errors });
        }
        Ok(())
    }

    /// Redacted key/value view for diagnostics. Credentials are omitted.
    pub fn to_debug_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("data_source", self.source.data_source.to_string());
        map.insert("azure_search_service", self.search.service.clone());
        map.insert("azure_search_index_name", self.search.index_name.clone());
        map.insert("azure_search_api_version", self.search.api_version.clone());
        map.insert(
            "azure_openai_embedding_endpoint",
            self.embedding.endpoint.clone(),
        );
        map.insert(
            "azure_openai_embedding_deployment",
            self.embedding.deployment.clone(),
        );
        map.insert(
            "csv_file_path",
            self.source.csv_file_path.display().to_string(),
        );
        map.insert(
            "checkpoint_file_path",
            self.source.checkpoint_file_path.display().to_string(),
        );
        map.insert("batch_size", self.pipeline.batch_size.to_string());
        map.insert(
            "sleep_between_requests",
            self.pipeline.sleep_between_requests.to_string(),
        );
        map.insert(
            "sleep_between_batches",
            self.pipeline.sleep_between_batches.to_string(),
        );
        if let Some(url) = &self.celonis.base_url {
            map.insert("celonis_base_url", url.clone());
        }
        map
    }
}
