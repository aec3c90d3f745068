//! Batch Ingestion Orchestrator
//!
//! Walks the video catalog page by page, one video at a time: skips videos
//! already ingested, fetches embeddings, upserts them into the vector store
//! and records a status event for every video. A failing video never aborts
//! the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use footage_core::{
    EmbeddingFetch, FootageError, FootageResult, IngestStatus, ListVideosParams, StatusEvent,
    VideoCatalog,
};
use footage_vector::VideoVectorStore;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::embedding_source::EmbeddingSourceClient;
use crate::pacer::Pacer;
use crate::status_ledger::StatusLedger;

/// Largest page the catalog serves
pub const MAX_PAGE_SIZE: u32 = 50;

/// Where the already-ingested set comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupSource {
    /// Distinct video ids found in a bounded scan of the vector store
    #[default]
    VectorStore,
    /// Videos whose current ledger status is `stored`
    Ledger,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub page_size: u32,
    /// 0 processes every page
    pub max_pages: u32,
    /// Pause between the end of one page and the listing of the next
    pub delay_between_pages: Duration,
    /// Pause between the end of one ingested video and the next fetch
    pub delay_between_videos: Duration,
    pub skip_existing: bool,
    pub dedup_source: DedupSource,
    /// Objects scanned when deduplicating against the vector store
    pub dedup_scan_limit: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_pages: 0,
            delay_between_pages: Duration::from_secs(2),
            delay_between_videos: Duration::from_secs(2),
            skip_existing: true,
            dedup_source: DedupSource::VectorStore,
            dedup_scan_limit: 2000,
        }
    }
}

/// Result of ingesting one video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub video_id: String,
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub segments_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestOutcome {
    fn new(video_id: &str, status: IngestStatus) -> Self {
        Self {
            video_id: video_id.to_string(),
            status,
            filename: None,
            segments_written: 0,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub stored: usize,
    pub skipped: usize,
    pub processing: usize,
    /// `failed` plus `error`
    pub failed: usize,
}

impl BatchSummary {
    fn count(&mut self, status: IngestStatus) {
        self.total += 1;
        match status {
            IngestStatus::Stored => self.stored += 1,
            IngestStatus::Skipped => self.skipped += 1,
            IngestStatus::Processing => self.processing += 1,
            IngestStatus::Failed | IngestStatus::Error => self.failed += 1,
            IngestStatus::Retrieved => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub pages_processed: u32,
    /// Pages the catalog reported, before any cap
    pub catalog_pages: u32,
    pub catalog_videos: u64,
    pub results: Vec<IngestOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// `PartialBatchFailure` when any video failed; the run itself completed
    pub fn partial_failure(&self) -> Option<FootageError> {
        (self.summary.failed > 0).then_some(FootageError::PartialBatchFailure {
            failed: self.summary.failed,
            total: self.summary.total,
        })
    }
}

pub struct BatchIngestor {
    catalog: Arc<dyn VideoCatalog>,
    source: Arc<EmbeddingSourceClient>,
    store: Arc<VideoVectorStore>,
    ledger: Arc<StatusLedger>,
}

impl BatchIngestor {
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        source: Arc<EmbeddingSourceClient>,
        store: Arc<VideoVectorStore>,
        ledger: Arc<StatusLedger>,
    ) -> Self {
        Self {
            catalog,
            source,
            store,
            ledger,
        }
    }

    /// Ingest every video of the catalog, page by page.
    ///
    /// Fails only if the first catalog page cannot be read.
    #[instrument(skip(self))]
    pub async fn run_batch(&self, options: &BatchOptions) -> FootageResult<BatchReport> {
        let started_at = Utc::now();
        let page_size = options.page_size.clamp(1, MAX_PAGE_SIZE);

        let first_page = self
            .catalog
            .list_videos(&ListVideosParams::page(1, page_size))
            .await?;

        let catalog_pages = if first_page.page_info.total_pages == 0 && !first_page.data.is_empty()
        {
            1
        } else {
            first_page.page_info.total_pages
        };
        let catalog_videos = first_page.page_info.total_results;
        let pages_to_process = if options.max_pages > 0 {
            catalog_pages.min(options.max_pages)
        } else {
            catalog_pages
        };

        info!(
            "Starting batch: {} videos over {} pages, processing {} pages",
            catalog_videos, catalog_pages, pages_to_process
        );

        let existing = if options.skip_existing {
            self.already_ingested(options).await
        } else {
            HashSet::new()
        };

        let page_pacer = Pacer::new(options.delay_between_pages, "pages");
        let video_pacer = Pacer::new(options.delay_between_videos, "videos");

        let mut summary = BatchSummary::default();
        let mut results = Vec::new();
        let mut pages_processed = 0;
        let mut first_page = Some(first_page);

        for page in 1..=pages_to_process {
            if page > 1 {
                page_pacer.pace().await;
            }

            let video_page = match first_page.take() {
                Some(p) if page == 1 => p,
                _ => match self
                    .catalog
                    .list_videos(&ListVideosParams::page(page, page_size))
                    .await
                {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Failed to list page {}: {}", page, e);
                        page_pacer.restart().await;
                        continue;
                    }
                },
            };
            pages_processed += 1;

            info!("Processing page {}/{}", page, pages_to_process);
            for video_id in video_page.video_ids() {
                let outcome = if existing.contains(&video_id) {
                    self.ledger
                        .record(StatusEvent::new(&video_id, IngestStatus::Skipped));
                    IngestOutcome::new(&video_id, IngestStatus::Skipped)
                } else {
                    video_pacer.pace().await;
                    let outcome = self.ingest_one(&video_id).await;
                    video_pacer.restart().await;
                    outcome
                };

                summary.count(outcome.status);
                results.push(outcome);
            }
            page_pacer.restart().await;
        }

        info!(
            "Batch complete: {} total, {} stored, {} skipped, {} processing, {} failed",
            summary.total, summary.stored, summary.skipped, summary.processing, summary.failed
        );

        let report = BatchReport {
            summary,
            pages_processed,
            catalog_pages,
            catalog_videos,
            results,
            started_at,
            finished_at: Utc::now(),
        };
        if let Some(partial) = report.partial_failure() {
            warn!("{}", partial);
        }
        Ok(report)
    }

    async fn already_ingested(&self, options: &BatchOptions) -> HashSet<String> {
        let existing = match options.dedup_source {
            DedupSource::VectorStore => self
                .store
                .existing_video_ids(Some(options.dedup_scan_limit))
                .await
                .map_err(|e| e.to_string()),
            DedupSource::Ledger => self
                .ledger
                .video_ids_with_status(IngestStatus::Stored)
                .map_err(|e| e.to_string()),
        };

        match existing {
            Ok(ids) => {
                info!("{} videos already ingested", ids.len());
                ids
            }
            Err(e) => {
                warn!("Could not read already-ingested set, ingesting all: {}", e);
                HashSet::new()
            }
        }
    }

    /// Fetch, upsert and record one video
    #[instrument(skip(self))]
    pub async fn ingest_one(&self, video_id: &str) -> IngestOutcome {
        let embedding = match self.source.fetch(video_id).await {
            EmbeddingFetch::Ready(embedding) => embedding,
            // The source already recorded the event for these
            EmbeddingFetch::Processing => {
                return IngestOutcome::new(video_id, IngestStatus::Processing)
            }
            EmbeddingFetch::Failed(msg) => {
                return IngestOutcome::new(video_id, IngestStatus::Failed).with_error(msg)
            }
            EmbeddingFetch::Error(msg) => {
                return IngestOutcome::new(video_id, IngestStatus::Error).with_error(msg)
            }
        };

        let mut outcome = match self
            .store
            .upsert(
                video_id,
                &embedding.segments,
                &embedding.filename,
                embedding.duration,
            )
            .await
        {
            Ok(report) if report.success() => {
                let mut outcome = IngestOutcome::new(video_id, IngestStatus::Stored);
                outcome.segments_written = report.written;
                outcome
            }
            Ok(report) => IngestOutcome::new(video_id, IngestStatus::Failed).with_error(
                report
                    .last_error
                    .unwrap_or_else(|| "No segment with a usable vector".to_string()),
            ),
            Err(e) => IngestOutcome::new(video_id, IngestStatus::Error).with_error(e.to_string()),
        };
        outcome.filename = Some(embedding.filename);

        let mut event = StatusEvent::new(video_id, outcome.status);
        if let Some(ref msg) = outcome.error {
            event = event.with_error(msg.clone());
        }
        self.ledger.record(event);

        outcome
    }

    /// Recreate the collection sized from the first catalog video.
    ///
    /// Destructive; every error propagates.
    #[instrument(skip(self))]
    pub async fn recreate_schema_from_sample(&self) -> FootageResult<usize> {
        let page = self
            .catalog
            .list_videos(&ListVideosParams::page(1, 1))
            .await?;
        let video_id = page
            .data
            .first()
            .map(|v| v.id.clone())
            .ok_or_else(|| FootageError::not_found("Catalog is empty, no sample video"))?;

        let dimensions = match self.source.fetch(&video_id).await {
            EmbeddingFetch::Ready(embedding) => embedding.dimensions(),
            other => {
                return Err(FootageError::no_embedding(format!(
                    "Sample video {} has no embedding ({})",
                    video_id,
                    other.error_message().unwrap_or(other.status().as_str())
                )))
            }
        }
        .ok_or_else(|| {
            FootageError::no_embedding(format!("Sample video {} has an empty vector", video_id))
        })?;

        info!("Sample video {} has {} dimensions", video_id, dimensions);
        self.store.recreate_schema(dimensions).await?;
        Ok(dimensions)
    }
}
