//! Embedding Source Client
//!
//! Fetches a video's embedding from the analysis service, applying the
//! visual-text-only fallback when audio embeddings are missing, and records
//! exactly one status event per fetch.

use std::sync::Arc;

use footage_core::{
    EmbeddingApi, EmbeddingFetch, EmbeddingOption, FootageError, StatusEvent, VideoEmbedding,
    VideoWithEmbeddings,
};
use tracing::{info, instrument, warn};

use crate::status_ledger::StatusLedger;

/// Error code the service returns when no embedding of a kind exists
const NO_EMBEDDINGS_MARKER: &str = "embed_no_embeddings_found";

/// Model name reported when the payload carries none
const UNKNOWN_MODEL: &str = "unknown";

pub struct EmbeddingSourceClient {
    api: Arc<dyn EmbeddingApi>,
    ledger: Arc<StatusLedger>,
}

impl EmbeddingSourceClient {
    pub fn new(api: Arc<dyn EmbeddingApi>, ledger: Arc<StatusLedger>) -> Self {
        Self { api, ledger }
    }

    /// Fetch the embedding of one video and record the outcome
    #[instrument(skip(self))]
    pub async fn fetch(&self, video_id: &str) -> EmbeddingFetch {
        let outcome = self.fetch_inner(video_id).await;

        let mut event = StatusEvent::new(video_id, outcome.status());
        if let Some(message) = outcome.error_message() {
            event = event.with_error(message);
        }
        self.ledger.record(event);

        outcome
    }

    async fn fetch_inner(&self, video_id: &str) -> EmbeddingFetch {
        let result = match self
            .api
            .get_video_with_embeddings(video_id, &EmbeddingOption::ALL)
            .await
        {
            Err(e) if is_missing_audio(&e) => {
                info!(
                    "No audio embeddings for {}, retrying with visual-text only",
                    video_id
                );
                self.api
                    .get_video_with_embeddings(video_id, &[EmbeddingOption::VisualText])
                    .await
            }
            other => other,
        };

        match result {
            Ok(video) => classify(video_id, video),
            Err(e) => {
                warn!("Embedding fetch for {} failed: {}", video_id, e);
                failure_outcome(e)
            }
        }
    }
}

/// 404 whose body says audio embeddings specifically are absent
fn is_missing_audio(error: &FootageError) -> bool {
    match error {
        FootageError::Api { status: 404, message } => {
            message.contains(NO_EMBEDDINGS_MARKER) && message.contains("audio")
        }
        _ => false,
    }
}

fn failure_outcome(error: FootageError) -> EmbeddingFetch {
    match error {
        FootageError::Api { status, message } => {
            EmbeddingFetch::Failed(format!("HTTP {}: {}", status, message))
        }
        FootageError::NotFound(_) | FootageError::NoEmbedding(_) => {
            EmbeddingFetch::Failed(error.to_string())
        }
        other => EmbeddingFetch::Error(other.to_string()),
    }
}

/// Turn a raw payload into a fetch outcome
fn classify(video_id: &str, video: VideoWithEmbeddings) -> EmbeddingFetch {
    if video.is_processing() {
        return EmbeddingFetch::Processing;
    }

    let filename = video.filename();
    let duration = video.duration();

    let Some(embedding) = video.embedding else {
        return EmbeddingFetch::Failed("No embedding in response".to_string());
    };
    let Some(raw) = embedding.video_embedding else {
        return EmbeddingFetch::Failed("No video_embedding in response".to_string());
    };

    let segments: Vec<_> = raw
        .segments
        .into_iter()
        .filter_map(|s| s.into_segment(duration))
        .collect();

    if segments.is_empty() {
        return EmbeddingFetch::Failed("Embedding has no usable segments".to_string());
    }

    EmbeddingFetch::Ready(VideoEmbedding {
        video_id: video_id.to_string(),
        model_name: embedding
            .model_name
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
        segments,
        filename,
        duration,
    })
}
