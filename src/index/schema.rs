//! Typed index schema sent at index-creation time
//!
//! Serializes to the exact Azure AI Search index definition JSON: EDM
//! field types, per-field attribute flags, and a `vectorSearch` section
//! with named algorithms and profiles.

use serde::Serialize;

/// Full index definition
#[derive(Debug, Clone, Serialize)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(rename = "vectorSearch")]
    pub vector_search: VectorSearchConfig,
}

/// EDM type of an index field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    #[serde(rename = "Edm.String")]
    String,
    #[serde(rename = "Edm.Int32")]
    Int32,
    #[serde(rename = "Edm.Int64")]
    Int64,
    #[serde(rename = "Edm.Double")]
    Double,
    #[serde(rename = "Edm.Boolean")]
    Boolean,
    #[serde(rename = "Edm.DateTimeOffset")]
    DateTimeOffset,
    /// Vector field type (collection of single-precision floats)
    #[serde(rename = "Collection(Edm.Single)")]
    SingleCollection,
}

/// One index field with its attribute flags
///
/// Only flags that are set serialize onto the wire, matching the service's
/// defaulting behavior.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "is_false")]
    pub key: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub searchable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub filterable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sortable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub retrievable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(rename = "vectorSearchProfile", skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            key: false,
            searchable: false,
            filterable: false,
            sortable: false,
            retrievable: false,
            dimensions: None,
            vector_search_profile: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn retrievable(mut self) -> Self {
        self.retrievable = true;
        self
    }

    /// Mark this field as the embedding vector, tied to a named profile
    pub fn vector(mut self, dimensions: usize, profile: &str) -> Self {
        self.dimensions = Some(dimensions);
        self.vector_search_profile = Some(profile.to_string());
        self
    }
}

/// Vector search section: ANN algorithms plus the profiles that bind
/// vector fields to one of them
#[derive(Debug, Clone, Serialize)]
pub struct VectorSearchConfig {
    pub algorithms: Vec<VectorSearchAlgorithm>,
    pub profiles: Vec<VectorSearchProfile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum VectorSearchAlgorithm {
    #[serde(rename = "hnsw")]
    Hnsw {
        name: String,
        #[serde(rename = "hnswParameters")]
        parameters: HnswParameters,
    },
    #[serde(rename = "exhaustiveKnn")]
    ExhaustiveKnn {
        name: String,
        #[serde(rename = "exhaustiveKnnParameters")]
        parameters: ExhaustiveKnnParameters,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct HnswParameters {
    pub metric: SimilarityMetric,
    pub m: u32,
    #[serde(rename = "efConstruction")]
    pub ef_construction: u32,
    #[serde(rename = "efSearch")]
    pub ef_search: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExhaustiveKnnParameters {
    pub metric: SimilarityMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimilarityMetric {
    #[serde(rename = "cosine")]
    Cosine,
    #[serde(rename = "euclidean")]
    Euclidean,
    #[serde(rename = "dotProduct")]
    DotProduct,
}

/// Binding between a vector field and an algorithm definition
#[derive(Debug, Clone, Serialize)]
pub struct VectorSearchProfile {
    pub name: String,
    pub algorithm: String,
}
