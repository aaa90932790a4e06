//! Celonis EMS source
//!
//! Extracts rows from a data model with a declarative PQL column query:
//! resolve the data pool (by id or name), resolve the data model within
//! it, then execute the column query and materialize the result as rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{CelonisConfig, CelonisKeyType};

use super::{Row, RowTable, SourceError, TabularSource};

/// One output column: a name plus the PQL expression producing it
#[derive(Debug, Clone, Serialize)]
pub struct PqlColumn {
    pub name: String,
    pub query: String,
}

impl PqlColumn {
    pub fn new(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Loads rows by querying a Celonis EMS data model
pub struct CelonisSource {
    http: reqwest::blocking::Client,
    base_url: String,
    authorization: String,
    pool_selector: String,
    model_selector: String,
    columns: Vec<PqlColumn>,
    limit: Option<usize>,
}

impl CelonisSource {
    /// Build a source from the Celonis configuration subset. Fails with a
    /// clear error when the connection settings are absent; callers should
    /// run `Config::validate_celonis` first for the full report.
    pub fn new(
        config: &CelonisConfig,
        columns: Vec<PqlColumn>,
        limit: Option<usize>,
    ) -> Result<Self, SourceError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            SourceError::Initialization("Celonis connection is not configured".to_string())
        })?;
        let token = config.api_token.as_deref().ok_or_else(|| {
            SourceError::Initialization("Celonis API token is not configured".to_string())
        })?;

        // Id takes precedence over name
        let pool_selector = config
            .data_pool_id
            .clone()
            .or_else(|| config.data_pool_name.clone())
            .ok_or_else(|| {
                SourceError::Initialization("Celonis data pool is not configured".to_string())
            })?;
        let model_selector = config
            .data_model_id
            .clone()
            .or_else(|| config.data_model_name.clone())
            .ok_or_else(|| {
                SourceError::Initialization("Celonis data model is not configured".to_string())
            })?;

        let authorization = match config.key_type {
            CelonisKeyType::AppKey => format!("AppKey {}", token),
            CelonisKeyType::UserKey => format!("Bearer {}", token),
        };

        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| SourceError::Initialization(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
            pool_selector,
            model_selector,
            columns,
            limit,
        })
    }

    fn get_json(&self, url: &str, operation: &'static str) -> Result<Value, SourceError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                detail: format!("{}: {}", operation, response.text().unwrap_or_default()),
            });
        }

        response
            .json()
            .map_err(|e| SourceError::MalformedResponse(e.to_string()))
    }

    fn resolve(
        &self,
        url: &str,
        selector: &str,
        kind: &'static str,
    ) -> Result<String, SourceError> {
        let listing = self.get_json(url, kind)?;
        let resources: Vec<NamedResource> = serde_json::from_value(listing)
            .map_err(|e| SourceError::MalformedResponse(e.to_string()))?;

        resources
            .into_iter()
            .find(|r| r.id == selector || r.name == selector)
            .map(|r| {
                tracing::info!(kind, id = %r.id, name = %r.name, "resolved");
                r.id
            })
            .ok_or_else(|| SourceError::NotFound {
                kind,
                selector: selector.to_string(),
            })
    }

    fn execute_query(&self, model_id: &str) -> Result<QueryResult, SourceError> {
        let url = format!(
            "{}/integration/api/data-models/{}/query",
            self.base_url, model_id
        );

        let mut body = json!({ "columns": self.columns });
        if let Some(limit) = self.limit {
            body["limit"] = json!(limit);
        }

        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                detail: format!("data model query: {}", response.text().unwrap_or_default()),
            });
        }

        response
            .json()
            .map_err(|e| SourceError::MalformedResponse(e.to_string()))
    }
}

impl TabularSource for CelonisSource {
    fn load(&self) -> Result<RowTable, SourceError> {
        tracing::info!(base_url = %self.base_url, "connecting to Celonis EMS");

        let pools_url = format!("{}/integration/api/pools", self.base_url);
        let pool_id = self.resolve(&pools_url, &self.pool_selector, "data pool")?;

        let models_url = format!(
            "{}/integration/api/pools/{}/data-models",
            self.base_url, pool_id
        );
        let model_id = self.resolve(&models_url, &self.model_selector, "data model")?;

        let result = self.execute_query(&model_id)?;

        let mut rows = Vec::with_capacity(result.rows.len());
        for values in result.rows {
            if values.len() != result.columns.len() {
                return Err(SourceError::MalformedResponse(format!(
                    "row width {} does not match {} columns",
                    values.len(),
                    result.columns.len()
                )));
            }
            let fields: BTreeMap<String, Value> = result
                .columns
                .iter()
                .cloned()
                .zip(values)
                .collect();
            rows.push(Row::new(fields));
        }

        tracing::info!(rows = rows.len(), "extracted rows from data model");
        Ok(RowTable::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> CelonisConfig {
        CelonisConfig {
            base_url: Some(base_url.to_string()),
            api_token: Some("token".to_string()),
            key_type: CelonisKeyType::AppKey,
            data_pool_name: Some("Procurement".to_string()),
            data_pool_id: None,
            data_model_name: None,
            data_model_id: Some("dm-1".to_string()),
        }
    }

    fn columns() -> Vec<PqlColumn> {
        vec![
            PqlColumn::new("Id", "\"ContractItem\".\"ID\""),
            PqlColumn::new("ShortText", "\"ContractItem\".\"ShortText\""),
        ]
    }

    #[test]
    fn unconfigured_connection_is_an_initialization_error() {
        let config = CelonisConfig {
            base_url: None,
            api_token: None,
            key_type: CelonisKeyType::AppKey,
            data_pool_name: None,
            data_pool_id: None,
            data_model_name: None,
            data_model_id: None,
        };
        assert!(matches!(
            CelonisSource::new(&config, columns(), None),
            Err(SourceError::Initialization(_))
        ));
    }

    #[test]
    fn resolves_pool_and_model_then_queries() {
        let mut server = mockito::Server::new();

        let pools = server
            .mock("GET", "/integration/api/pools")
            .match_header("authorization", "AppKey token")
            .with_status(200)
            .with_body(
                json!([
                    { "id": "pool-9", "name": "Procurement" },
                    { "id": "pool-2", "name": "Finance" }
                ])
                .to_string(),
            )
            .create();

        let models = server
            .mock("GET", "/integration/api/pools/pool-9/data-models")
            .with_status(200)
            .with_body(json!([{ "id": "dm-1", "name": "Contracts" }]).to_string())
            .create();

        let query = server
            .mock("POST", "/integration/api/data-models/dm-1/query")
            .match_body(mockito::Matcher::Json(json!({
                "columns": [
                    { "name": "Id", "query": "\"ContractItem\".\"ID\"" },
                    { "name": "ShortText", "query": "\"ContractItem\".\"ShortText\"" }
                ],
                "limit": 10
            })))
            .with_status(200)
            .with_body(
                json!({
                    "columns": ["Id", "ShortText"],
                    "rows": [
                        ["A-1", "Office chair"],
                        ["A-2", "Standing desk"]
                    ]
                })
                .to_string(),
            )
            .create();

        let source = CelonisSource::new(&test_config(&server.url()), columns(), Some(10)).unwrap();
        let table = source.load().unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].fields["Id"], "A-1");
        assert_eq!(table.rows[1].fields["ShortText"], "Standing desk");

        pools.assert();
        models.assert();
        query.assert();
    }

    #[test]
    fn unknown_pool_is_a_not_found_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/integration/api/pools")
            .with_status(200)
            .with_body(json!([{ "id": "pool-2", "name": "Finance" }]).to_string())
            .create();

        let source = CelonisSource::new(&test_config(&server.url()), columns(), None).unwrap();
        assert!(matches!(
            source.load(),
            Err(SourceError::NotFound { kind: "data pool", .. })
        ));
    }
}
