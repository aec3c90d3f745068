//! In-memory vector backend
//!
//! Brute-force cosine search over a process-local map. Mirrors the store's
//! observable behaviour (upsert by id, fixed dimensionality per collection,
//! nearest-first ordering) so services can run without a live cluster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use footage_core::{FootageError, FootageResult};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{CollectionSchema, Neighbor, PropertyFilter, VectorBackend};
use crate::record::RecordProperties;
use crate::similarity::cosine_distance;

struct MemoryCollection {
    dimensions: Option<usize>,
    objects: IndexMap<Uuid, (RecordProperties, Vec<f32>)>,
}

pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    available: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away; every call fails until re-enabled
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> FootageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FootageError::upstream("vector store unavailable"))
        }
    }

    fn missing(name: &str) -> FootageError {
        FootageError::not_found(format!("Collection not found: {}", name))
    }
}

fn matches_filter(props: &RecordProperties, filter: &PropertyFilter) -> bool {
    match filter.property.as_str() {
        "video_id" => props.video_id == filter.value,
        "filename" => props.filename == filter.value,
        "embedding_type" => props.embedding_type.as_str() == filter.value,
        "scope" => props.scope.as_str() == filter.value,
        _ => false,
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn collection_exists(&self, name: &str) -> FootageResult<bool> {
        self.check_available()?;
        Ok(self.collections.read().contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> FootageResult<()> {
        self.check_available()?;
        let mut collections = self.collections.write();
        if collections.contains_key(&schema.name) {
            return Err(FootageError::storage(format!(
                "Collection already exists: {}",
                schema.name
            )));
        }
        collections.insert(
            schema.name.clone(),
            MemoryCollection {
                dimensions: schema.dimensions,
                objects: IndexMap::new(),
            },
        );
        debug!("Created in-memory collection {}", schema.name);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> FootageResult<()> {
        self.check_available()?;
        self.collections.write().remove(name);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &RecordProperties,
        vector: &[f32],
    ) -> FootageResult<()> {
        self.check_available()?;
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing(collection))?;

        match coll.dimensions {
            Some(expected) if expected != vector.len() => {
                return Err(FootageError::SchemaMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            None => coll.dimensions = Some(vector.len()),
            _ => {}
        }

        coll.objects.insert(id, (properties.clone(), vector.to_vec()));
        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> FootageResult<Vec<Neighbor>> {
        self.check_available()?;
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;

        let mut hits: Vec<Neighbor> = coll
            .objects
            .iter()
            .map(|(id, (props, stored))| Neighbor {
                id: Some(*id),
                properties: props.clone(),
                distance: cosine_distance(vector, stored),
            })
            .collect();

        // Stable sort keeps insertion order among equal distances
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fetch_by_filter(
        &self,
        collection: &str,
        filter: Option<&PropertyFilter>,
        limit: usize,
    ) -> FootageResult<Vec<RecordProperties>> {
        self.check_available()?;
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;

        Ok(coll
            .objects
            .values()
            .map(|(props, _)| props)
            .filter(|props| filter.is_none_or(|f| matches_filter(props, f)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str) -> FootageResult<usize> {
        self.check_available()?;
        let collections = self.collections.read();
        collections
            .get(collection)
            .map(|c| c.objects.len())
            .ok_or_else(|| Self::missing(collection))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
