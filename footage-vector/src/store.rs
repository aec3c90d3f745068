//! Video vector store adapter
//!
//! Owns the collection schema and turns video segments into idempotent
//! upserts and nearest-neighbour queries against a [`VectorBackend`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use footage_core::{EmbeddingOption, EmbeddingScope, FootageError, FootageResult, Segment};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::backend::{CollectionSchema, Neighbor, PropertyFilter, VectorBackend};
use crate::record::VectorRecord;

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "NatureVideo";

/// Default number of objects scanned for the stored-id set
const EXISTING_SCAN_LIMIT: usize = 2000;

/// Outcome of writing one video's segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub written: usize,
    pub skipped_empty: usize,
    /// Later segments sharing an (option, scope) already taken
    pub duplicates: usize,
    pub mismatched: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl UpsertReport {
    pub fn success(&self) -> bool {
        self.written > 0
    }
}

/// Summary of what is stored in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection: String,
    pub total_objects: usize,
    pub sampled_objects: usize,
    pub unique_videos: usize,
    pub average_objects_per_video: f64,
    pub embedding_types: BTreeMap<String, usize>,
    pub scopes: BTreeMap<String, usize>,
}

pub struct VideoVectorStore {
    backend: Arc<dyn VectorBackend>,
    collection: String,
    dimensions: RwLock<Option<usize>>,
    schema_ready: AtomicBool,
    schema_lock: Mutex<()>,
}

impl VideoVectorStore {
    pub fn new(backend: Arc<dyn VectorBackend>, collection: impl Into<String>) -> Self {
        Self {
            backend,
            collection: collection.into(),
            dimensions: RwLock::new(None),
            schema_ready: AtomicBool::new(false),
            schema_lock: Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Dimensionality of stored vectors, once known
    pub fn dimensions(&self) -> Option<usize> {
        *self.dimensions.read()
    }

    /// Create the collection if it does not exist.
    ///
    /// Returns `true` when this call created it.
    pub async fn ensure_schema(&self) -> FootageResult<bool> {
        self.ensure_schema_with(None).await
    }

    async fn ensure_schema_with(&self, dimensions: Option<usize>) -> FootageResult<bool> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(false);
        }

        let _guard = self.schema_lock.lock().await;
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(false);
        }

        let created = if self.backend.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);
            false
        } else {
            let schema = CollectionSchema::video_segments(&self.collection, dimensions);
            self.backend.create_collection(&schema).await?;
            if dimensions.is_some() {
                *self.dimensions.write() = dimensions;
            }
            info!(
                "Created collection {} on {} backend",
                self.collection,
                self.backend.name()
            );
            true
        };

        self.schema_ready.store(true, Ordering::Release);
        Ok(created)
    }

    /// Drop and recreate the collection with a fixed dimensionality.
    ///
    /// Destroys every stored record. Failures propagate.
    #[instrument(skip(self))]
    pub async fn recreate_schema(&self, dimensions: usize) -> FootageResult<()> {
        if dimensions == 0 {
            return Err(FootageError::config("Cannot create a collection with 0 dimensions"));
        }

        let _guard = self.schema_lock.lock().await;
        self.schema_ready.store(false, Ordering::Release);

        if self.backend.collection_exists(&self.collection).await? {
            self.backend.delete_collection(&self.collection).await?;
            info!("Deleted collection {}", self.collection);
        }

        let schema = CollectionSchema::video_segments(&self.collection, Some(dimensions));
        self.backend.create_collection(&schema).await?;
        *self.dimensions.write() = Some(dimensions);
        self.schema_ready.store(true, Ordering::Release);

        info!(
            "Recreated collection {} with {} dimensions",
            self.collection, dimensions
        );
        Ok(())
    }

    /// Write each usable segment of a video.
    ///
    /// Segments with an empty vector are skipped; the first segment for a
    /// given (option, scope) wins. Per-segment failures are counted in the
    /// report. Fails only when the collection itself cannot be reached.
    #[instrument(skip(self, segments), fields(segments = segments.len()))]
    pub async fn upsert(
        &self,
        video_id: &str,
        segments: &[Segment],
        filename: &str,
        duration: f64,
    ) -> FootageResult<UpsertReport> {
        let mut report = UpsertReport::default();

        let first_dims = segments.iter().map(Segment::dimensions).find(|d| *d > 0);
        self.ensure_schema_with(first_dims).await?;

        let mut seen: HashSet<(EmbeddingOption, EmbeddingScope)> = HashSet::new();
        for segment in segments {
            if segment.is_empty() {
                report.skipped_empty += 1;
                continue;
            }
            if !seen.insert((segment.option, segment.scope)) {
                report.duplicates += 1;
                continue;
            }

            if let Err(e) = self.check_dimensions(segment.dimensions()) {
                warn!("Skipping {} segment of {}: {}", segment.option, video_id, e);
                report.mismatched += 1;
                report.last_error = Some(e.to_string());
                continue;
            }

            let record = VectorRecord::from_segment(video_id, filename, duration, segment);
            match self
                .backend
                .upsert(&self.collection, record.id, &record.properties, &record.vector)
                .await
            {
                Ok(()) => {
                    self.dimensions.write().get_or_insert(record.vector.len());
                    report.written += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to write {}/{} segment of {}: {}",
                        segment.option, segment.scope, video_id, e
                    );
                    report.failed += 1;
                    report.last_error = Some(e.to_string());
                }
            }
        }

        debug!(
            "Upserted {}: {} written, {} skipped, {} failed",
            video_id,
            report.written,
            report.skipped_empty + report.duplicates,
            report.failed + report.mismatched
        );
        Ok(report)
    }

    fn check_dimensions(&self, actual: usize) -> FootageResult<()> {
        match *self.dimensions.read() {
            Some(expected) if expected != actual => {
                Err(FootageError::SchemaMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Nearest records to a vector, closest first
    #[instrument(skip(self, vector))]
    pub async fn query(&self, vector: &[f32], limit: usize) -> FootageResult<Vec<Neighbor>> {
        if vector.is_empty() {
            return Err(FootageError::no_embedding("Query vector is empty"));
        }
        self.check_dimensions(vector.len())?;
        self.backend
            .nearest_neighbors(&self.collection, vector, limit)
            .await
    }

    /// Video ids present among the first `limit` stored objects
    pub async fn existing_video_ids(&self, limit: Option<usize>) -> FootageResult<HashSet<String>> {
        let limit = limit.unwrap_or(EXISTING_SCAN_LIMIT);
        let records = self
            .backend
            .fetch_by_filter(&self.collection, None, limit)
            .await?;
        let ids: HashSet<String> = records.into_iter().map(|r| r.video_id).collect();
        info!("Found {} videos already in {}", ids.len(), self.collection);
        Ok(ids)
    }

    pub async fn contains_video(&self, video_id: &str) -> FootageResult<bool> {
        let filter = PropertyFilter::equal("video_id", video_id);
        let found = self
            .backend
            .fetch_by_filter(&self.collection, Some(&filter), 1)
            .await?;
        Ok(!found.is_empty())
    }

    /// Object count plus a breakdown over a sample of stored records
    #[instrument(skip(self))]
    pub async fn collection_stats(&self, sample: usize) -> FootageResult<CollectionStats> {
        let total_objects = self.backend.count(&self.collection).await?;
        let records = self
            .backend
            .fetch_by_filter(&self.collection, None, sample)
            .await?;

        let mut videos = HashSet::new();
        let mut embedding_types = BTreeMap::new();
        let mut scopes = BTreeMap::new();
        for record in &records {
            videos.insert(record.video_id.as_str());
            *embedding_types
                .entry(record.embedding_type.as_str().to_string())
                .or_insert(0) += 1;
            *scopes.entry(record.scope.as_str().to_string()).or_insert(0) += 1;
        }

        let unique_videos = videos.len();
        let average_objects_per_video = if unique_videos > 0 {
            records.len() as f64 / unique_videos as f64
        } else {
            0.0
        };

        Ok(CollectionStats {
            collection: self.collection.clone(),
            total_objects,
            sampled_objects: records.len(),
            unique_videos,
            average_objects_per_video,
            embedding_types,
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn segment(option: EmbeddingOption, scope: EmbeddingScope, vector: Vec<f32>) -> Segment {
        Segment {
            option,
            scope,
            start_offset_sec: 0.0,
            end_offset_sec: 10.0,
            vector,
        }
    }

    fn store() -> (Arc<InMemoryBackend>, VideoVectorStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = VideoVectorStore::new(backend.clone(), DEFAULT_COLLECTION);
        (backend, store)
    }

    #[tokio::test]
    async fn test_upsert_twice_yields_one_record() {
        let (backend, store) = store();
        let segs = vec![segment(
            EmbeddingOption::VisualText,
            EmbeddingScope::Video,
            vec![0.1, 0.2, 0.3],
        )];

        assert!(store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap().success());
        assert!(store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap().success());

        assert_eq!(backend.count(DEFAULT_COLLECTION).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_self_match_similarity() {
        let (_, store) = store();
        let vector = vec![0.1, 0.2, 0.3, 0.4];
        let segs = vec![segment(
            EmbeddingOption::VisualText,
            EmbeddingScope::Video,
            vector.clone(),
        )];
        store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap();

        let hits = store.query(&vector, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].properties.video_id, "V1");
        assert!((hits[0].similarity() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_first_segment_per_kind_wins() {
        let (backend, store) = store();
        let segs = vec![
            segment(EmbeddingOption::VisualText, EmbeddingScope::Clip, vec![1.0, 0.0]),
            segment(EmbeddingOption::VisualText, EmbeddingScope::Clip, vec![0.0, 1.0]),
            segment(EmbeddingOption::Audio, EmbeddingScope::Clip, vec![]),
        ];

        let report = store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.skipped_empty, 1);

        let hits = backend
            .nearest_neighbors(DEFAULT_COLLECTION, &[1.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_counted() {
        let (_, store) = store();
        store.recreate_schema(3).await.unwrap();

        let segs = vec![segment(
            EmbeddingOption::VisualText,
            EmbeddingScope::Video,
            vec![1.0, 0.0],
        )];
        let report = store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap();
        assert!(!report.success());
        assert_eq!(report.mismatched, 1);

        let err = store.query(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, FootageError::SchemaMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_all_empty_segments_is_not_success() {
        let (_, store) = store();
        let segs = vec![segment(EmbeddingOption::VisualText, EmbeddingScope::Video, vec![])];
        let report = store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap();
        assert!(!report.success());
        assert_eq!(report.skipped_empty, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_closed() {
        let (backend, store) = store();
        backend.set_available(false);

        let segs = vec![segment(EmbeddingOption::VisualText, EmbeddingScope::Video, vec![1.0])];
        let err = store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_recreate_schema_drops_records() {
        let (backend, store) = store();
        let segs = vec![segment(EmbeddingOption::VisualText, EmbeddingScope::Video, vec![1.0, 0.5])];
        store.upsert("V1", &segs, "v1.mp4", 10.0).await.unwrap();

        store.recreate_schema(2).await.unwrap();
        assert_eq!(backend.count(DEFAULT_COLLECTION).await.unwrap(), 0);
        assert_eq!(store.dimensions(), Some(2));
        assert!(store.recreate_schema(0).await.is_err());
    }

    #[tokio::test]
    async fn test_existing_ids_and_stats() {
        let (_, store) = store();
        for vid in ["V1", "V2"] {
            let segs = vec![
                segment(EmbeddingOption::VisualText, EmbeddingScope::Video, vec![1.0, 0.0]),
                segment(EmbeddingOption::Audio, EmbeddingScope::Clip, vec![0.0, 1.0]),
            ];
            store.upsert(vid, &segs, "x.mp4", 10.0).await.unwrap();
        }

        let ids = store.existing_video_ids(None).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(store.contains_video("V2").await.unwrap());
        assert!(!store.contains_video("V3").await.unwrap());

        let stats = store.collection_stats(100).await.unwrap();
        assert_eq!(stats.total_objects, 4);
        assert_eq!(stats.unique_videos, 2);
        assert!((stats.average_objects_per_video - 2.0).abs() < 1e-9);
        assert_eq!(stats.embedding_types.get("audio"), Some(&2));
        assert_eq!(stats.scopes.get("video"), Some(&2));
    }
}
