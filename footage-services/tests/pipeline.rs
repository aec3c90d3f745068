//! End-to-end ingestion and similarity flows against an in-process
//! analysis service and the in-memory vector backend.
//!
//! Run with: cargo test -p footage-services --test pipeline

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use footage_core::{
    CatalogVideo, EmbeddingApi, EmbeddingOption, EmbeddingScope, FootageError, FootageResult,
    ListVideosParams, MetadataStore, PageInfo, ResultSource, Segment, SystemMetadata,
    UserMetadata, VideoCatalog, VideoPage, VideoWithEmbeddings,
};
use footage_services::{
    BatchIngestor, BatchOptions, EmbeddingSourceClient, SimilarityCache, SimilarityCacheConfig,
    StatusLedger, CACHE_LIST_KEY,
};
use footage_vector::{InMemoryBackend, VectorBackend, VideoVectorStore, DEFAULT_COLLECTION};
use serde_json::json;

#[derive(Clone)]
enum Script {
    /// Video-scope visual-text plus audio
    Full(Vec<f32>),
    /// Audio requests 404 with the no-embeddings marker
    VisualOnly(Vec<f32>),
    /// Visual-text only at clip scope
    ClipOnly(Vec<f32>),
    AudioOnly(Vec<f32>),
    HttpError(u16),
    Transport,
}

#[derive(Default)]
struct FakeService {
    pages: Vec<Vec<String>>,
    scripts: Mutex<HashMap<String, Script>>,
    list_calls: AtomicUsize,
    embed_calls: Mutex<Vec<String>>,
    metadata: Mutex<HashMap<String, UserMetadata>>,
    put_calls: AtomicUsize,
    put_fails: AtomicBool,
}

impl FakeService {
    fn with_pages(pages: Vec<Vec<String>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    fn script(&self, video_id: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(video_id.to_string(), script);
    }

    fn embed_calls_for(&self, video_id: &str) -> usize {
        self.embed_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == video_id)
            .count()
    }
}

fn payload(video_id: &str, segments: serde_json::Value) -> VideoWithEmbeddings {
    serde_json::from_value(json!({
        "_id": video_id,
        "system_metadata": { "filename": format!("{}.mp4", video_id), "duration": 20.0 },
        "embedding": {
            "model_name": "Marengo-retrieval-2.7",
            "video_embedding": { "segments": segments }
        }
    }))
    .unwrap()
}

fn raw_segment(option: &str, scope: &str, vector: &[f32]) -> serde_json::Value {
    json!({
        "embedding_option": option,
        "embedding_scope": scope,
        "start_offset_sec": 0.0,
        "end_offset_sec": 20.0,
        "float": vector
    })
}

#[async_trait]
impl VideoCatalog for FakeService {
    async fn list_videos(&self, params: &ListVideosParams) -> FootageResult<VideoPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let ids = self
            .pages
            .get(params.page as usize - 1)
            .cloned()
            .ok_or_else(|| FootageError::not_found(format!("page {}", params.page)))?;

        Ok(VideoPage {
            data: ids
                .into_iter()
                .map(|id| CatalogVideo {
                    id,
                    system_metadata: SystemMetadata::default(),
                    user_metadata: None,
                })
                .collect(),
            page_info: PageInfo {
                page: params.page,
                limit_per_page: params.page_limit,
                total_pages: self.pages.len() as u32,
                total_results: self.pages.iter().map(Vec::len).sum::<usize>() as u64,
            },
        })
    }
}

#[async_trait]
impl EmbeddingApi for FakeService {
    async fn get_video_with_embeddings(
        &self,
        video_id: &str,
        options: &[EmbeddingOption],
    ) -> FootageResult<VideoWithEmbeddings> {
        self.embed_calls.lock().unwrap().push(video_id.to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(video_id)
            .cloned()
            .unwrap_or(Script::HttpError(404));

        match script {
            Script::Full(v) => Ok(payload(
                video_id,
                json!([
                    raw_segment("visual-text", "video", &v),
                    raw_segment("audio", "video", &v)
                ]),
            )),
            Script::VisualOnly(v) => {
                if options.contains(&EmbeddingOption::Audio) {
                    Err(FootageError::api(
                        404,
                        r#"{"code":"embed_no_embeddings_found","message":"No audio embeddings"}"#,
                    ))
                } else {
                    Ok(payload(video_id, json!([raw_segment("visual-text", "video", &v)])))
                }
            }
            Script::ClipOnly(v) => Ok(payload(
                video_id,
                json!([raw_segment("visual-text", "clip", &v)]),
            )),
            Script::AudioOnly(v) => Ok(payload(video_id, json!([raw_segment("audio", "video", &v)]))),
            Script::HttpError(status) => Err(FootageError::api(status, "scripted failure")),
            Script::Transport => Err(FootageError::upstream("connection refused")),
        }
    }
}

#[async_trait]
impl MetadataStore for FakeService {
    async fn get_user_metadata(&self, video_id: &str) -> FootageResult<UserMetadata> {
        Ok(self
            .metadata
            .lock()
            .unwrap()
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_user_metadata(&self, video_id: &str, metadata: UserMetadata) -> FootageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.put_fails.load(Ordering::SeqCst) {
            return Err(FootageError::api(500, "metadata write rejected"));
        }
        self.metadata
            .lock()
            .unwrap()
            .entry(video_id.to_string())
            .or_default()
            .extend(metadata);
        Ok(())
    }
}

struct Harness {
    service: Arc<FakeService>,
    ledger: Arc<StatusLedger>,
    store: Arc<VideoVectorStore>,
    backend: Arc<InMemoryBackend>,
    ingestor: BatchIngestor,
    cache: SimilarityCache,
}

fn harness(service: FakeService) -> Harness {
    let service = Arc::new(service);
    let ledger = Arc::new(StatusLedger::new_in_memory().unwrap());
    let backend = Arc::new(InMemoryBackend::new());
    let store = Arc::new(VideoVectorStore::new(backend.clone(), DEFAULT_COLLECTION));
    let source = Arc::new(EmbeddingSourceClient::new(service.clone(), ledger.clone()));

    let ingestor = BatchIngestor::new(service.clone(), source.clone(), store.clone(), ledger.clone());
    let cache = SimilarityCache::new(
        service.clone(),
        source,
        store.clone(),
        SimilarityCacheConfig::default(),
    );

    Harness {
        service,
        ledger,
        store,
        backend,
        ingestor,
        cache,
    }
}

fn no_delay() -> BatchOptions {
    BatchOptions {
        delay_between_pages: Duration::ZERO,
        delay_between_videos: Duration::ZERO,
        ..BatchOptions::default()
    }
}

fn ids(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect()
}

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[tokio::test]
async fn skip_existing_never_fetches_stored_videos() {
    let h = harness(FakeService::with_pages(vec![vec!["A".into(), "B".into()]]));
    h.service.script("B", Script::Full(vec![0.0, 1.0]));

    let seg = Segment {
        option: EmbeddingOption::VisualText,
        scope: EmbeddingScope::Video,
        start_offset_sec: 0.0,
        end_offset_sec: 20.0,
        vector: vec![1.0, 0.0],
    };
    h.store.upsert("A", &[seg], "A.mp4", 20.0).await.unwrap();

    let report = h.ingestor.run_batch(&no_delay()).await.unwrap();

    assert_eq!(h.service.embed_calls_for("A"), 0);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.stored, 1);
}

#[tokio::test]
async fn failing_video_does_not_abort_batch() {
    let h = harness(FakeService::with_pages(vec![vec![
        "A".into(),
        "B".into(),
        "C".into(),
    ]]));
    h.service.script("A", Script::Full(vec![1.0, 0.0]));
    h.service.script("B", Script::HttpError(500));
    h.service.script("C", Script::Full(vec![0.0, 1.0]));

    let report = h.ingestor.run_batch(&no_delay()).await.unwrap();

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.stored, 2);
    assert_eq!(report.summary.failed, 1);

    let outcomes: Vec<(&str, &str)> = report
        .results
        .iter()
        .map(|o| (o.video_id.as_str(), o.status.as_str()))
        .collect();
    assert_eq!(
        outcomes,
        vec![("A", "stored"), ("B", "failed"), ("C", "stored")]
    );
    assert!(matches!(
        report.partial_failure(),
        Some(FootageError::PartialBatchFailure { failed: 1, total: 3 })
    ));

    let summary = h.ledger.summarize().unwrap();
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn max_pages_caps_the_run() {
    let h = harness(FakeService::with_pages(vec![ids("p1-", 50), ids("p2-", 50)]));
    for id in ids("p1-", 50) {
        h.service.script(&id, Script::Full(vec![1.0, 0.5]));
    }

    let options = BatchOptions {
        max_pages: 1,
        ..no_delay()
    };
    let report = h.ingestor.run_batch(&options).await.unwrap();

    assert_eq!(report.summary.total, 50);
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.catalog_pages, 2);
    assert_eq!(report.catalog_videos, 100);
    // Page 1 is reused, not fetched twice
    assert_eq!(h.service.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.service.embed_calls_for("p2-0"), 0);
}

#[tokio::test]
async fn visual_only_video_is_stored() {
    let h = harness(FakeService::with_pages(vec![vec!["V".into()]]));
    h.service.script("V", Script::VisualOnly(vec![0.3, 0.4]));

    let report = h.ingestor.run_batch(&no_delay()).await.unwrap();
    assert_eq!(report.summary.stored, 1);
    assert_eq!(h.service.embed_calls_for("V"), 2);
}

#[tokio::test]
async fn similarity_cache_respects_ttl() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::Full(vec![1.0, 0.0, 0.0]));
    h.service.script("N", Script::Full(vec![0.9, 0.1, 0.0]));
    h.ingestor.ingest_one("N").await;

    let fresh = h.cache.find_similar_at("Q", 5, t0()).await.unwrap();
    assert_eq!(fresh.source, ResultSource::Fresh);
    assert_eq!(fresh.similar_videos.len(), 1);
    assert_eq!(fresh.similar_videos[0].video_id, "N");
    assert_eq!(h.service.put_calls.load(Ordering::SeqCst), 1);

    let calls_after_fill = h.service.embed_calls_for("Q");

    let hit = h
        .cache
        .find_similar_at("Q", 5, t0() + chrono::Duration::seconds(86_399))
        .await
        .unwrap();
    assert_eq!(hit.source, ResultSource::Cache);
    assert_eq!(hit.cache_age_secs, Some(86_399));
    assert_eq!(hit.similar_videos, fresh.similar_videos);
    assert_eq!(h.service.embed_calls_for("Q"), calls_after_fill);

    let expired = h
        .cache
        .find_similar_at("Q", 5, t0() + chrono::Duration::seconds(86_401))
        .await
        .unwrap();
    assert_eq!(expired.source, ResultSource::Fresh);
    assert_eq!(h.service.embed_calls_for("Q"), calls_after_fill + 1);
}

#[tokio::test]
async fn similar_videos_exclude_the_query_video() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::Full(vec![1.0, 0.0]));
    for (id, v) in [("A", vec![0.9, 0.1]), ("B", vec![0.5, 0.5]), ("C", vec![0.1, 0.9])] {
        h.service.script(id, Script::Full(v));
        h.ingestor.ingest_one(id).await;
    }

    let result = h.cache.find_similar_at("Q", 2, t0()).await.unwrap();
    let found: Vec<&str> = result
        .similar_videos
        .iter()
        .map(|v| v.video_id.as_str())
        .collect();

    assert_eq!(found, vec!["A", "B"]);
    assert_eq!(result.query_scope, Some(EmbeddingScope::Video));
    // The query video was stored along the way
    assert!(h.store.contains_video("Q").await.unwrap());
}

#[tokio::test]
async fn clip_fallback_marks_scope() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::ClipOnly(vec![1.0, 0.0]));
    h.service.script("A", Script::Full(vec![1.0, 0.1]));
    h.ingestor.ingest_one("A").await;

    let result = h.cache.find_similar_at("Q", 5, t0()).await.unwrap();
    assert_eq!(result.query_scope, Some(EmbeddingScope::Clip));
    assert_eq!(result.similar_videos[0].video_id, "A");
}

#[tokio::test]
async fn empty_result_is_not_cached() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::AudioOnly(vec![1.0, 0.0]));

    let result = h.cache.find_similar_at("Q", 5, t0()).await.unwrap();
    assert!(result.similar_videos.is_empty());
    assert_eq!(h.service.put_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.count(DEFAULT_COLLECTION).await.unwrap_or(0), 0);
}

#[tokio::test]
async fn refill_failure_still_returns_fresh_results() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::Full(vec![1.0, 0.0]));
    h.service.script("A", Script::Full(vec![0.8, 0.2]));
    h.ingestor.ingest_one("A").await;
    h.service.put_fails.store(true, Ordering::SeqCst);

    let result = h.cache.find_similar_at("Q", 5, t0()).await.unwrap();
    assert_eq!(result.source, ResultSource::Fresh);
    assert_eq!(result.similar_videos.len(), 1);
    assert!(!h.service.metadata.lock().unwrap().contains_key("Q"));
}

#[tokio::test]
async fn stale_entry_served_when_recompute_fails() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::Full(vec![1.0, 0.0]));
    h.service.script("A", Script::Full(vec![0.8, 0.2]));
    h.ingestor.ingest_one("A").await;
    h.cache.find_similar_at("Q", 5, t0()).await.unwrap();

    h.service.script("Q", Script::Transport);
    let later = t0() + chrono::Duration::seconds(90_000);
    let result = h.cache.find_similar_at("Q", 5, later).await.unwrap();

    assert_eq!(result.source, ResultSource::Cache);
    assert_eq!(result.cache_age_secs, Some(90_000));
    assert_eq!(result.similar_videos[0].video_id, "A");
}

#[tokio::test]
async fn recompute_failure_without_cache_is_an_error() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::Transport);

    let err = h.cache.find_similar_at("Q", 5, t0()).await.unwrap_err();
    assert!(err.is_upstream());
}

#[tokio::test]
async fn explain_is_read_only() {
    let h = harness(FakeService::default());
    h.service.script("Q", Script::ClipOnly(vec![1.0, 0.0]));
    h.service.script("A", Script::Full(vec![0.9, 0.1]));
    h.ingestor.ingest_one("A").await;

    let report = h.cache.explain_similar("Q").await.unwrap();

    assert_eq!(report.segments.len(), 1);
    let choice = report.representative.unwrap();
    assert!(choice.clip_fallback);
    assert_eq!(choice.dimensions, 2);
    assert!(!report.in_store);
    assert!(report.cache.is_none());
    assert_eq!(report.preview.len(), 1);

    assert!(!h.store.contains_video("Q").await.unwrap());
    assert_eq!(h.service.put_calls.load(Ordering::SeqCst), 0);
    assert!(!h
        .service
        .metadata
        .lock()
        .unwrap()
        .get("Q")
        .is_some_and(|m| m.contains_key(CACHE_LIST_KEY)));
}
