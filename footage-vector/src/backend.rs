//! Vector store backend interface

use async_trait::async_trait;
use footage_core::FootageResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::RecordProperties;

/// HNSW index parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    pub ef_construction: u32,
    pub max_connections: u32,
    pub vector_cache_max_objects: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            ef_construction: 128,
            max_connections: 16,
            vector_cache_max_objects: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    /// Store data type ("text" or "number")
    pub data_type: String,
    pub description: String,
}

impl PropertySpec {
    fn new(name: &str, data_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            description: description.to_string(),
        }
    }
}

/// Collection definition: cosine distance, HNSW index, vectors supplied externally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub index: HnswConfig,
    /// Fixed dimensionality, when known at creation time
    pub dimensions: Option<usize>,
    pub properties: Vec<PropertySpec>,
}

impl CollectionSchema {
    /// Schema for per-segment video embedding records
    pub fn video_segments(name: impl Into<String>, dimensions: Option<usize>) -> Self {
        Self {
            name: name.into(),
            description: "Nature video embeddings from Twelve Labs".to_string(),
            index: HnswConfig::default(),
            dimensions,
            properties: vec![
                PropertySpec::new("video_id", "text", "Twelve Labs video ID"),
                PropertySpec::new("filename", "text", "Original filename"),
                PropertySpec::new("duration", "number", "Video duration in seconds"),
                PropertySpec::new(
                    "embedding_type",
                    "text",
                    "Type of embedding (visual-text, audio)",
                ),
                PropertySpec::new("scope", "text", "Scope of embedding (clip, video)"),
                PropertySpec::new("start_time", "number", "Start time of the clip"),
                PropertySpec::new("end_time", "number", "End time of the clip"),
            ],
        }
    }
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: Option<Uuid>,
    pub properties: RecordProperties,
    /// Cosine distance (0.0 = identical)
    pub distance: f64,
}

impl Neighbor {
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Equality filter on a text property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub value: String,
}

impl PropertyFilter {
    pub fn equal(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// Collection-oriented vector store
///
/// Implementations:
/// - `WeaviateBackend`: Weaviate over REST/GraphQL
/// - `InMemoryBackend`: process-local, brute-force cosine search
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn collection_exists(&self, name: &str) -> FootageResult<bool>;

    async fn create_collection(&self, schema: &CollectionSchema) -> FootageResult<()>;

    async fn delete_collection(&self, name: &str) -> FootageResult<()>;

    /// Insert or replace the object with this id
    async fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &RecordProperties,
        vector: &[f32],
    ) -> FootageResult<()>;

    /// Nearest objects first
    async fn nearest_neighbors(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> FootageResult<Vec<Neighbor>>;

    async fn fetch_by_filter(
        &self,
        collection: &str,
        filter: Option<&PropertyFilter>,
        limit: usize,
    ) -> FootageResult<Vec<RecordProperties>>;

    async fn count(&self, collection: &str) -> FootageResult<usize>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
