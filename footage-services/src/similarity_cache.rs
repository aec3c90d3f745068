//! Similarity Cache
//!
//! Cache-aside "find similar videos": answers from the video's own user
//! metadata while the stored entry is younger than the TTL, otherwise
//! recomputes against the vector store and writes the result back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use footage_core::{
    EmbeddingFetch, EmbeddingOption, EmbeddingScope, FootageError, FootageResult, MetadataStore,
    ResultSource, Segment, SimilarVideo, SimilarityResult, UserMetadata, VideoEmbedding,
};
use footage_vector::{Neighbor, VideoVectorStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::embedding_source::EmbeddingSourceClient;

/// Metadata key holding the JSON-encoded neighbour list
pub const CACHE_LIST_KEY: &str = "similar_videos_str";
/// Metadata key holding the write time, Unix seconds
pub const CACHE_TIMESTAMP_KEY: &str = "similar_videos_timestamp";

/// Cache validity window (24 hours)
pub const DEFAULT_TTL_SECS: u64 = 86_400;

const PREVIEW_LIMIT: usize = 3;

/// Records one video can own: every (option, scope) pair
const RECORDS_PER_VIDEO: usize = EmbeddingOption::ALL.len() * 2;

#[derive(Debug, Clone)]
pub struct SimilarityCacheConfig {
    pub ttl: Duration,
}

impl Default for SimilarityCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

/// A cache entry read back from user metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSimilar {
    pub videos: Vec<SimilarVideo>,
    /// Write time in Unix seconds; `None` for entries written without one
    pub written_at: Option<i64>,
}

impl CachedSimilar {
    pub fn age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.written_at.map(|ts| now.timestamp() - ts)
    }

    /// Fresh iff `now - written_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_secs(now)
            .is_some_and(|age| age < ttl.as_secs() as i64)
    }

    /// Parse the entry out of user metadata, if one is present and readable
    pub fn from_metadata(metadata: &UserMetadata) -> Option<Self> {
        let raw = metadata.get(CACHE_LIST_KEY)?;
        let videos = match raw {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        };
        let videos: Vec<SimilarVideo> = match videos {
            Ok(v) => v,
            Err(e) => {
                warn!("Unreadable {} in metadata: {}", CACHE_LIST_KEY, e);
                return None;
            }
        };

        let written_at = metadata.get(CACHE_TIMESTAMP_KEY).and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

        Some(Self { videos, written_at })
    }

    /// Metadata fields that persist this entry
    pub fn to_metadata(videos: &[SimilarVideo], now: DateTime<Utc>) -> FootageResult<UserMetadata> {
        let encoded = serde_json::to_string(videos)
            .map_err(|e| FootageError::internal(format!("Failed to encode cache entry: {}", e)))?;

        let mut metadata = UserMetadata::new();
        metadata.insert(CACHE_LIST_KEY.to_string(), Value::String(encoded));
        metadata.insert(CACHE_TIMESTAMP_KEY.to_string(), Value::from(now.timestamp()));
        Ok(metadata)
    }
}

/// Shape of one segment, without its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub option: EmbeddingOption,
    pub scope: EmbeddingScope,
    pub start_offset_sec: f64,
    pub end_offset_sec: f64,
    pub dimensions: usize,
}

impl From<&Segment> for SegmentSummary {
    fn from(segment: &Segment) -> Self {
        Self {
            option: segment.option,
            scope: segment.scope,
            start_offset_sec: segment.start_offset_sec,
            end_offset_sec: segment.end_offset_sec,
            dimensions: segment.dimensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepresentativeChoice {
    pub option: EmbeddingOption,
    /// Scope reported on results
    pub scope: EmbeddingScope,
    pub dimensions: usize,
    pub clip_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInspection {
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<i64>,
    pub fresh: bool,
}

/// Read-only report of how a similarity query would run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityDiagnostics {
    pub video_id: String,
    pub filename: String,
    pub model_name: String,
    pub segments: Vec<SegmentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative: Option<RepresentativeChoice>,
    pub in_store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheInspection>,
    pub preview: Vec<SimilarVideo>,
}

pub struct SimilarityCache {
    metadata: Arc<dyn MetadataStore>,
    source: Arc<EmbeddingSourceClient>,
    store: Arc<VideoVectorStore>,
    config: SimilarityCacheConfig,
}

impl SimilarityCache {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        source: Arc<EmbeddingSourceClient>,
        store: Arc<VideoVectorStore>,
        config: SimilarityCacheConfig,
    ) -> Self {
        Self {
            metadata,
            source,
            store,
            config,
        }
    }

    pub async fn find_similar(&self, video_id: &str, limit: usize) -> FootageResult<SimilarityResult> {
        self.find_similar_at(video_id, limit, Utc::now()).await
    }

    /// `find_similar` evaluated at a given instant
    #[instrument(skip(self, now))]
    pub async fn find_similar_at(
        &self,
        video_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> FootageResult<SimilarityResult> {
        let cached = self.read_cache(video_id).await;

        if let Some(ref entry) = cached {
            if entry.is_fresh(now, self.config.ttl) {
                debug!("Cache hit for {}", video_id);
                return Ok(cache_result(video_id, entry, now));
            }
            debug!("Stale cache entry for {}", video_id);
        }

        match self.recompute(video_id, limit).await {
            Ok(result) => {
                if !result.similar_videos.is_empty() {
                    self.write_cache(video_id, &result.similar_videos, now).await;
                }
                Ok(result)
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(
                        "Recompute for {} failed, serving stale cache entry: {}",
                        video_id, e
                    );
                    Ok(cache_result(video_id, &entry, now))
                }
                None => Err(e),
            },
        }
    }

    async fn read_cache(&self, video_id: &str) -> Option<CachedSimilar> {
        match self.metadata.get_user_metadata(video_id).await {
            Ok(metadata) => CachedSimilar::from_metadata(&metadata),
            Err(e) => {
                warn!("Could not read metadata for {}: {}", video_id, e);
                None
            }
        }
    }

    async fn write_cache(&self, video_id: &str, videos: &[SimilarVideo], now: DateTime<Utc>) {
        let result = match CachedSimilar::to_metadata(videos, now) {
            Ok(metadata) => self.metadata.put_user_metadata(video_id, metadata).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!("Cached {} similar videos for {}", videos.len(), video_id),
            Err(e) => warn!("Failed to cache similar videos for {}: {}", video_id, e),
        }
    }

    async fn fetch_embedding(&self, video_id: &str) -> FootageResult<VideoEmbedding> {
        match self.source.fetch(video_id).await {
            EmbeddingFetch::Ready(embedding) => Ok(embedding),
            EmbeddingFetch::Processing => Err(FootageError::no_embedding(format!(
                "Embedding for {} is still processing",
                video_id
            ))),
            EmbeddingFetch::Failed(msg) => Err(FootageError::no_embedding(msg)),
            EmbeddingFetch::Error(msg) => Err(FootageError::upstream(msg)),
        }
    }

    async fn recompute(&self, video_id: &str, limit: usize) -> FootageResult<SimilarityResult> {
        let embedding = self.fetch_embedding(video_id).await?;

        let Some((segment, scope)) = embedding.representative() else {
            info!("No visual-text vector for {}, nothing to compare", video_id);
            return Ok(SimilarityResult::empty(video_id));
        };

        let report = self
            .store
            .upsert(
                video_id,
                &embedding.segments,
                &embedding.filename,
                embedding.duration,
            )
            .await?;
        if !report.success() {
            warn!(
                "Query video {} could not be stored: {}",
                video_id,
                report.last_error.as_deref().unwrap_or("no usable segment")
            );
        }

        let neighbors = self
            .store
            .query(&segment.vector, neighbor_window(limit))
            .await?;
        let mut result = SimilarityResult::empty(video_id);
        result.similar_videos = rank_neighbors(video_id, neighbors, limit);
        result.query_scope = Some(scope);
        Ok(result)
    }

    /// Describe how a similarity query for this video would run.
    ///
    /// Read-only: nothing is upserted and the cache is left untouched.
    #[instrument(skip(self))]
    pub async fn explain_similar(&self, video_id: &str) -> FootageResult<SimilarityDiagnostics> {
        let now = Utc::now();
        let embedding = self.fetch_embedding(video_id).await?;

        let representative = embedding
            .representative()
            .map(|(segment, scope)| RepresentativeChoice {
                option: segment.option,
                scope,
                dimensions: segment.dimensions(),
                clip_fallback: scope == EmbeddingScope::Clip,
            });

        let in_store = match self.store.contains_video(video_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Could not check store for {}: {}", video_id, e);
                false
            }
        };

        let cache = self.read_cache(video_id).await.map(|entry| CacheInspection {
            entries: entry.videos.len(),
            age_secs: entry.age_secs(now),
            fresh: entry.is_fresh(now, self.config.ttl),
        });

        let preview = match embedding.representative() {
            Some((segment, _)) => match self
                .store
                .query(&segment.vector, neighbor_window(PREVIEW_LIMIT))
                .await
            {
                Ok(neighbors) => rank_neighbors(video_id, neighbors, PREVIEW_LIMIT),
                Err(e) => {
                    warn!("Preview query for {} failed: {}", video_id, e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(SimilarityDiagnostics {
            video_id: video_id.to_string(),
            filename: embedding.filename.clone(),
            model_name: embedding.model_name.clone(),
            segments: embedding.segments.iter().map(SegmentSummary::from).collect(),
            representative,
            in_store,
            cache,
            preview,
        })
    }
}

fn cache_result(video_id: &str, entry: &CachedSimilar, now: DateTime<Utc>) -> SimilarityResult {
    SimilarityResult {
        video_id: video_id.to_string(),
        similar_videos: entry.videos.clone(),
        source: ResultSource::Cache,
        cache_age_secs: entry.age_secs(now),
        query_scope: None,
    }
}

/// Neighbours to request for `limit` results.
///
/// One extra video for the self-match, and room for every record a
/// video may own so de-duplication cannot starve the result.
fn neighbor_window(limit: usize) -> usize {
    limit.saturating_add(1).saturating_mul(RECORDS_PER_VIDEO)
}

/// Drop the query video, keep the nearest record per video, cap at `limit`
fn rank_neighbors(video_id: &str, neighbors: Vec<Neighbor>, limit: usize) -> Vec<SimilarVideo> {
    let mut seen = HashSet::new();
    neighbors
        .into_iter()
        .filter(|n| n.properties.video_id != video_id)
        .filter(|n| seen.insert(n.properties.video_id.clone()))
        .take(limit)
        .map(|n| n.properties.to_similar_video().with_similarity(n.similarity()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use footage_vector::RecordProperties;

    fn neighbor(video_id: &str, distance: f64) -> Neighbor {
        Neighbor {
            id: None,
            properties: RecordProperties {
                video_id: video_id.to_string(),
                filename: format!("{}.mp4", video_id),
                duration: 10.0,
                embedding_type: EmbeddingOption::VisualText,
                scope: EmbeddingScope::Video,
                start_time: 0.0,
                end_time: 10.0,
            },
            distance,
        }
    }

    #[test]
    fn test_rank_neighbors_excludes_self_and_dedupes() {
        let neighbors = vec![
            neighbor("q", 0.0),
            neighbor("a", 0.1),
            neighbor("a", 0.2),
            neighbor("b", 0.3),
            neighbor("c", 0.4),
        ];

        let ranked = rank_neighbors("q", neighbors, 2);
        let ids: Vec<&str> = ranked.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((ranked[0].similarity_score.unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_neighbor_window_covers_self_records() {
        assert_eq!(neighbor_window(5), 24);
        assert!(neighbor_window(0) >= RECORDS_PER_VIDEO);
    }

    #[test]
    fn test_neighbor_window_saturates() {
        assert_eq!(neighbor_window(usize::MAX), usize::MAX);
        assert_eq!(neighbor_window(usize::MAX / 2), usize::MAX);
    }

    #[test]
    fn test_cache_entry_round_trip_through_metadata() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let videos = vec![
            SimilarVideo::new("a", "a.mp4").with_similarity(0.993_883_728_981_018_1),
            SimilarVideo::new("b", "b.mp4").with_similarity(1.0 - 0.153_679_013_252_258_3),
        ];

        let metadata = CachedSimilar::to_metadata(&videos, now).unwrap();
        assert!(metadata[CACHE_LIST_KEY].is_string());

        let entry = CachedSimilar::from_metadata(&metadata).unwrap();
        assert_eq!(entry.videos, videos);
        assert_eq!(entry.written_at, Some(1_700_000_000));
    }

    #[test]
    fn test_freshness_boundary() {
        let written = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let entry = CachedSimilar {
            videos: Vec::new(),
            written_at: Some(written.timestamp()),
        };
        let ttl = Duration::from_secs(DEFAULT_TTL_SECS);

        assert!(entry.is_fresh(written + chrono::Duration::seconds(86_399), ttl));
        assert!(!entry.is_fresh(written + chrono::Duration::seconds(86_400), ttl));
        assert!(!entry.is_fresh(written + chrono::Duration::seconds(86_401), ttl));
    }

    #[test]
    fn test_entry_without_timestamp_is_stale() {
        let mut metadata = UserMetadata::new();
        metadata.insert(
            CACHE_LIST_KEY.to_string(),
            Value::String(r#"[{"video_id":"a","filename":"a.mp4"}]"#.to_string()),
        );

        let entry = CachedSimilar::from_metadata(&metadata).unwrap();
        assert_eq!(entry.videos.len(), 1);
        assert!(!entry.is_fresh(Utc::now(), Duration::from_secs(DEFAULT_TTL_SECS)));
    }

    #[test]
    fn test_unreadable_entry_is_a_miss() {
        let mut metadata = UserMetadata::new();
        metadata.insert(CACHE_LIST_KEY.to_string(), Value::String("not json".to_string()));
        assert!(CachedSimilar::from_metadata(&metadata).is_none());
    }
}
