//! Interfaces of the video-understanding service
//!
//! The catalog, the embedding endpoint and the per-video metadata store are
//! all served by the same external service. They are modelled as separate
//! traits so each consumer depends only on what it uses.

use async_trait::async_trait;

use crate::{EmbeddingOption, FootageResult, ListVideosParams, VideoPage, VideoWithEmbeddings};

/// Free-form per-video metadata owned by the analysis service
pub type UserMetadata = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn list_videos(&self, params: &ListVideosParams) -> FootageResult<VideoPage>;
}

#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    /// Fetch a video together with the requested embedding kinds.
    ///
    /// Non-success responses surface as `FootageError::Api` carrying the
    /// status code and raw body so callers can inspect service markers.
    async fn get_video_with_embeddings(
        &self,
        video_id: &str,
        options: &[EmbeddingOption],
    ) -> FootageResult<VideoWithEmbeddings>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_user_metadata(&self, video_id: &str) -> FootageResult<UserMetadata>;

    /// Merge `metadata` into the video's user metadata
    async fn put_user_metadata(&self, video_id: &str, metadata: UserMetadata) -> FootageResult<()>;
}
