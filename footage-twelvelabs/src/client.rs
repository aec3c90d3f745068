//! Twelve Labs API client
//!
//! Provides methods for interacting with the Twelve Labs REST API.

use async_trait::async_trait;
use footage_core::{
    EmbeddingApi, EmbeddingOption, FootageError, FootageResult, ListVideosParams, MetadataStore,
    UserMetadata, VideoCatalog, VideoPage, VideoWithEmbeddings,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Base URL for the Twelve Labs API
pub const TWELVELABS_API_BASE: &str = "https://api.twelvelabs.io/v1.3";

#[derive(Debug, Clone)]
pub struct TwelveLabsConfig {
    pub api_key: String,
    pub index_id: String,
    pub base_url: String,
    /// Per-request network timeout
    pub timeout: Duration,
}

impl TwelveLabsConfig {
    pub fn new(api_key: impl Into<String>, index_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            index_id: index_id.into(),
            base_url: TWELVELABS_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Twelve Labs API client
#[derive(Clone)]
pub struct TwelveLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    index_id: String,
}

impl TwelveLabsClient {
    pub fn new(config: TwelveLabsConfig) -> FootageResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(FootageError::config("Twelve Labs API key is empty"));
        }
        if config.index_id.trim().is_empty() {
            return Err(FootageError::config("Twelve Labs index id is empty"));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FootageError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            index_id: config.index_id,
        })
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    fn videos_url(&self) -> FootageResult<Url> {
        Url::parse(&format!(
            "{}/indexes/{}/videos",
            self.base_url, self.index_id
        ))
        .map_err(|e| FootageError::config(format!("Invalid Twelve Labs URL: {}", e)))
    }

    /// URL for one page of the catalog listing
    pub fn list_videos_url(&self, params: &ListVideosParams) -> FootageResult<Url> {
        let mut url = self.videos_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &params.page.to_string())
                .append_pair("page_limit", &params.page_limit.to_string())
                .append_pair("sort_by", &params.sort_by)
                .append_pair("sort_option", params.sort_option.as_str());
            if let Some(ref filename) = params.filename {
                query.append_pair("filename", filename);
            }
        }
        Ok(url)
    }

    /// URL for a single video, optionally requesting embeddings.
    ///
    /// Each requested option becomes a repeated `embedding_option` parameter.
    pub fn video_url(&self, video_id: &str, options: &[EmbeddingOption]) -> FootageResult<Url> {
        let mut url = self.videos_url()?;
        url.path_segments_mut()
            .map_err(|_| FootageError::config("Twelve Labs base URL cannot be a base"))?
            .push(video_id);

        if !options.is_empty() {
            let mut query = url.query_pairs_mut();
            for option in options {
                query.append_pair("embedding_option", option.as_str());
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> FootageResult<T> {
        debug!("Fetching {} from: {}", what, url);

        let response = self
            .client
            .get(url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| FootageError::upstream(format!("Failed to fetch {}: {}", what, e)))?;

        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| FootageError::parse(format!("Failed to parse {}: {}", what, e)))
    }

    /// Map non-success responses to `FootageError::Api`, keeping the raw body
    async fn check_status(response: Response) -> FootageResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(FootageError::api(status, body))
    }

    /// Fetch video details without embeddings
    #[instrument(skip(self))]
    pub async fn get_video_info(&self, video_id: &str) -> FootageResult<VideoWithEmbeddings> {
        let url = self.video_url(video_id, &[])?;
        match self.get_json(url, "video info").await {
            Err(FootageError::Api { status: 404, .. }) => Err(FootageError::not_found(format!(
                "Video not found: {}",
                video_id
            ))),
            other => other,
        }
    }
}

#[async_trait]
impl VideoCatalog for TwelveLabsClient {
    #[instrument(skip(self))]
    async fn list_videos(&self, params: &ListVideosParams) -> FootageResult<VideoPage> {
        info!("Listing videos: page {}, limit {}", params.page, params.page_limit);
        let url = self.list_videos_url(params)?;
        match self.get_json(url, "video list").await {
            Err(FootageError::Api { status: 404, .. }) => Err(FootageError::not_found(format!(
                "Catalog page not found: {}",
                params.page
            ))),
            other => other,
        }
    }
}

#[async_trait]
impl EmbeddingApi for TwelveLabsClient {
    #[instrument(skip(self))]
    async fn get_video_with_embeddings(
        &self,
        video_id: &str,
        options: &[EmbeddingOption],
    ) -> FootageResult<VideoWithEmbeddings> {
        let url = self.video_url(video_id, options)?;
        self.get_json(url, "video embeddings").await
    }
}

#[async_trait]
impl MetadataStore for TwelveLabsClient {
    #[instrument(skip(self))]
    async fn get_user_metadata(&self, video_id: &str) -> FootageResult<UserMetadata> {
        let video = self.get_video_info(video_id).await?;
        Ok(video.user_metadata.unwrap_or_default())
    }

    #[instrument(skip(self, metadata))]
    async fn put_user_metadata(&self, video_id: &str, metadata: UserMetadata) -> FootageResult<()> {
        let url = self.video_url(video_id, &[])?;
        info!("Updating metadata for video {}", video_id);

        let response = self
            .client
            .put(url)
            .header("x-api-key", &self.api_key)
            .json(&json!({ "user_metadata": metadata }))
            .send()
            .await
            .map_err(|e| FootageError::upstream(format!("Failed to update metadata: {}", e)))?;

        match Self::check_status(response).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Metadata update for {} rejected: {}", video_id, e);
                Err(e)
            }
        }
    }
}
