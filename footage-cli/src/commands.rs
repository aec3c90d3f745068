//! Subcommand handlers
//!
//! Each handler returns JSON data or a pipeline error; `main` wraps the
//! outcome in the response envelope.

use std::sync::Arc;
use std::time::Duration;

use footage_core::{EmbeddingFetch, FootageError, FootageResult, IngestStatus};
use footage_services::{
    BatchIngestor, BatchOptions, DedupSource, EmbeddingSourceClient, SegmentSummary,
    SimilarityCache, SimilarityCacheConfig, StatusLedger,
};
use footage_twelvelabs::TwelveLabsClient;
use footage_vector::{InMemoryBackend, VectorBackend, VideoVectorStore, WeaviateBackend};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Settings;

/// Every long-lived handle, opened once at startup
pub struct App {
    pub store: Arc<VideoVectorStore>,
    pub ledger: Arc<StatusLedger>,
    pub source: Arc<EmbeddingSourceClient>,
    pub ingestor: BatchIngestor,
    pub cache: SimilarityCache,
}

impl App {
    pub async fn open(settings: &Settings) -> anyhow::Result<Self> {
        let twelvelabs = Arc::new(TwelveLabsClient::new(settings.twelvelabs())?);
        info!("Using Twelve Labs index {}", twelvelabs.index_id());

        let backend: Arc<dyn VectorBackend> = match settings.weaviate() {
            Some(config) => Arc::new(WeaviateBackend::connect(config).await?),
            None => {
                warn!("WEAVIATE_URL not set, vectors are kept in memory for this run only");
                Arc::new(InMemoryBackend::new())
            }
        };
        let store = Arc::new(VideoVectorStore::new(backend, &settings.collection));

        let ledger = Arc::new(StatusLedger::new(&settings.status_db)?);
        let source = Arc::new(EmbeddingSourceClient::new(
            twelvelabs.clone(),
            ledger.clone(),
        ));

        let ingestor = BatchIngestor::new(
            twelvelabs.clone(),
            source.clone(),
            store.clone(),
            ledger.clone(),
        );
        let cache = SimilarityCache::new(
            twelvelabs,
            source.clone(),
            store.clone(),
            SimilarityCacheConfig::default(),
        );

        Ok(Self {
            store,
            ledger,
            source,
            ingestor,
            cache,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> FootageResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| FootageError::internal(format!("Failed to encode output: {}", e)))
}

pub struct BatchArgs {
    pub page_size: u32,
    pub max_pages: u32,
    pub delay_secs: f64,
    pub video_delay_secs: f64,
    pub skip_existing: bool,
    pub dedup_source: DedupSource,
}

impl BatchArgs {
    pub fn options(&self) -> FootageResult<BatchOptions> {
        Ok(BatchOptions {
            page_size: self.page_size,
            max_pages: self.max_pages,
            delay_between_pages: delay("--delay", self.delay_secs)?,
            delay_between_videos: delay("--video-delay", self.video_delay_secs)?,
            skip_existing: self.skip_existing,
            dedup_source: self.dedup_source,
            ..BatchOptions::default()
        })
    }
}

/// Negative delays clamp to zero; infinite ones are rejected
fn delay(flag: &str, secs: f64) -> FootageResult<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .map_err(|e| FootageError::config(format!("Invalid {} of {}: {}", flag, secs, e)))
}

pub async fn batch_embed(app: &App, args: &BatchArgs) -> FootageResult<Value> {
    let report = app.ingestor.run_batch(&args.options()?).await?;
    to_json(&report)
}

pub async fn ingest(app: &App, video_id: &str) -> FootageResult<Value> {
    let outcome = app.ingestor.ingest_one(video_id).await;
    let message = || {
        format!(
            "Ingestion of {} {}: {}",
            video_id,
            outcome.status,
            outcome.error.as_deref().unwrap_or("unknown error")
        )
    };
    match outcome.status {
        IngestStatus::Failed => Err(FootageError::no_embedding(message())),
        IngestStatus::Error => Err(FootageError::upstream(message())),
        _ => to_json(&outcome),
    }
}

pub async fn embedding(app: &App, video_id: &str) -> FootageResult<Value> {
    match app.source.fetch(video_id).await {
        EmbeddingFetch::Ready(embedding) => {
            let segments: Vec<SegmentSummary> =
                embedding.segments.iter().map(SegmentSummary::from).collect();
            Ok(json!({
                "video_id": embedding.video_id,
                "filename": embedding.filename,
                "duration": embedding.duration,
                "model_name": embedding.model_name,
                "dimensions": embedding.dimensions(),
                "segments": segments,
            }))
        }
        EmbeddingFetch::Processing => Err(FootageError::no_embedding(format!(
            "Embedding for {} is still processing",
            video_id
        ))),
        EmbeddingFetch::Failed(msg) => Err(FootageError::no_embedding(msg)),
        EmbeddingFetch::Error(msg) => Err(FootageError::upstream(msg)),
    }
}

pub async fn similar(app: &App, video_id: &str, limit: usize) -> FootageResult<Value> {
    let result = app.cache.find_similar(video_id, limit).await?;
    to_json(&result)
}

pub async fn explain(app: &App, video_id: &str) -> FootageResult<Value> {
    let report = app.cache.explain_similar(video_id).await?;
    to_json(&report)
}

pub async fn recreate_schema(app: &App, dimensions: Option<usize>) -> FootageResult<Value> {
    let dimensions = match dimensions {
        Some(d) => {
            app.store.recreate_schema(d).await?;
            d
        }
        None => app.ingestor.recreate_schema_from_sample().await?,
    };
    Ok(json!({
        "collection": app.store.collection(),
        "dimensions": dimensions,
    }))
}

pub fn status(app: &App, video_id: Option<&str>) -> FootageResult<Value> {
    match video_id {
        Some(id) => to_json(&app.ledger.events(Some(id))?),
        None => to_json(&app.ledger.summarize()?),
    }
}

pub async fn stats(app: &App, sample: usize) -> FootageResult<Value> {
    let stats = app.store.collection_stats(sample).await?;
    to_json(&stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_args_to_options() {
        let args = BatchArgs {
            page_size: 20,
            max_pages: 3,
            delay_secs: 1.5,
            video_delay_secs: -1.0,
            skip_existing: false,
            dedup_source: DedupSource::Ledger,
        };
        let options = args.options().unwrap();

        assert_eq!(options.page_size, 20);
        assert_eq!(options.max_pages, 3);
        assert_eq!(options.delay_between_pages, Duration::from_millis(1500));
        assert_eq!(options.delay_between_videos, Duration::ZERO);
        assert!(!options.skip_existing);
        assert_eq!(options.dedup_source, DedupSource::Ledger);
        assert_eq!(options.dedup_scan_limit, 2000);
    }

    #[test]
    fn test_infinite_delay_is_config_error() {
        let args = BatchArgs {
            page_size: 50,
            max_pages: 0,
            delay_secs: f64::INFINITY,
            video_delay_secs: 2.0,
            skip_existing: true,
            dedup_source: DedupSource::VectorStore,
        };

        let err = args.options().unwrap_err();
        assert!(matches!(err, FootageError::Config(_)));
        assert!(err.to_string().contains("--delay"));
    }
}
