//! Video catalog and embedding data structures

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::service::UserMetadata;

/// Kind of signal an embedding was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmbeddingOption {
    #[serde(rename = "visual-text")]
    VisualText,
    #[serde(rename = "audio")]
    Audio,
}

impl EmbeddingOption {
    pub const ALL: [EmbeddingOption; 2] = [EmbeddingOption::VisualText, EmbeddingOption::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingOption::VisualText => "visual-text",
            EmbeddingOption::Audio => "audio",
        }
    }
}

impl fmt::Display for EmbeddingOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "visual-text" | "visual_text" | "visual" => Ok(EmbeddingOption::VisualText),
            "audio" => Ok(EmbeddingOption::Audio),
            _ => Err(format!("Unknown embedding option: {}", s)),
        }
    }
}

/// Time span an embedding covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingScope {
    /// A fixed-length slice of the video
    Clip,
    /// The whole video
    Video,
}

impl EmbeddingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingScope::Clip => "clip",
            EmbeddingScope::Video => "video",
        }
    }
}

impl fmt::Display for EmbeddingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clip" => Ok(EmbeddingScope::Clip),
            "video" => Ok(EmbeddingScope::Video),
            _ => Err(format!("Unknown embedding scope: {}", s)),
        }
    }
}

/// One embedding vector covering a time range of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub option: EmbeddingOption,
    pub scope: EmbeddingScope,
    /// Start offset in seconds
    pub start_offset_sec: f64,
    /// End offset in seconds (>= start)
    pub end_offset_sec: f64,
    pub vector: Vec<f32>,
}

impl Segment {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

/// A video's multi-segment embedding as returned by the analysis service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEmbedding {
    pub video_id: String,
    pub model_name: String,
    pub segments: Vec<Segment>,
    /// Original filename (from user metadata, falling back to system metadata)
    pub filename: String,
    /// Duration in seconds
    pub duration: f64,
}

impl VideoEmbedding {
    /// Dimensionality of the first segment, used to size a new collection
    pub fn dimensions(&self) -> Option<usize> {
        self.segments
            .first()
            .map(|s| s.dimensions())
            .filter(|d| *d > 0)
    }

    /// Pick the vector that represents the whole video for similarity search.
    ///
    /// Prefers the video-scope visual-text segment; otherwise the first
    /// visual-text segment of any scope, reported as `Clip`. Returns `None`
    /// when there is no non-empty visual-text vector at all.
    pub fn representative(&self) -> Option<(&Segment, EmbeddingScope)> {
        let visual = || {
            self.segments
                .iter()
                .filter(|s| s.option == EmbeddingOption::VisualText && !s.is_empty())
        };

        if let Some(seg) = visual().find(|s| s.scope == EmbeddingScope::Video) {
            return Some((seg, EmbeddingScope::Video));
        }

        visual().next().map(|seg| (seg, EmbeddingScope::Clip))
    }
}

/// Outcome of fetching one video's embedding
#[derive(Debug, Clone)]
pub enum EmbeddingFetch {
    Ready(VideoEmbedding),
    /// Analysis has not finished yet; retry in a later run
    Processing,
    /// The service answered but has no usable embedding
    Failed(String),
    /// Transport or decode failure
    Error(String),
}

impl EmbeddingFetch {
    pub fn status(&self) -> crate::IngestStatus {
        use crate::IngestStatus;
        match self {
            EmbeddingFetch::Ready(_) => IngestStatus::Retrieved,
            EmbeddingFetch::Processing => IngestStatus::Processing,
            EmbeddingFetch::Failed(_) => IngestStatus::Failed,
            EmbeddingFetch::Error(_) => IngestStatus::Error,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            EmbeddingFetch::Failed(msg) | EmbeddingFetch::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn into_ready(self) -> Option<VideoEmbedding> {
        match self {
            EmbeddingFetch::Ready(embedding) => Some(embedding),
            _ => None,
        }
    }
}

// ============================================================================
// Wire types of the analysis service
// ============================================================================

/// System-assigned metadata of an indexed video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetadata {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Video payload returned when embeddings are requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoWithEmbeddings {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub system_metadata: SystemMetadata,
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
    #[serde(default)]
    pub embedding: Option<RawEmbedding>,
    /// Some index versions report readiness at the top level
    #[serde(default)]
    pub embedding_status: Option<String>,
}

impl VideoWithEmbeddings {
    /// Filename from user metadata, then system metadata, then "unknown"
    pub fn filename(&self) -> String {
        self.user_metadata
            .as_ref()
            .and_then(|m| m.get("filename"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.system_metadata.filename.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn duration(&self) -> f64 {
        self.system_metadata.duration.unwrap_or(0.0)
    }

    /// Whether the service reports the embedding as still being computed
    pub fn is_processing(&self) -> bool {
        let status = self
            .embedding
            .as_ref()
            .and_then(|e| e.status.as_deref())
            .or(self.embedding_status.as_deref());

        matches!(
            status.map(|s| s.to_lowercase()).as_deref(),
            Some("processing" | "pending" | "queued" | "indexing")
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEmbedding {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub video_embedding: Option<RawVideoEmbedding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVideoEmbedding {
    #[serde(default)]
    pub segments: Vec<RawSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    pub embedding_option: String,
    pub embedding_scope: String,
    #[serde(default)]
    pub start_offset_sec: Option<f64>,
    #[serde(default)]
    pub end_offset_sec: Option<f64>,
    #[serde(default, rename = "float", alias = "float_")]
    pub vector: Vec<f32>,
}

impl RawSegment {
    /// Convert to a typed segment.
    ///
    /// Returns `None` for unknown options/scopes or an end offset before the
    /// start. A missing end offset defaults to the video duration.
    pub fn into_segment(self, duration: f64) -> Option<Segment> {
        let option = self.embedding_option.parse().ok()?;
        let scope = self.embedding_scope.parse().ok()?;
        let start = self.start_offset_sec.unwrap_or(0.0);
        let end = self.end_offset_sec.unwrap_or(duration.max(start));

        if end < start {
            return None;
        }

        Some(Segment {
            option,
            scope,
            start_offset_sec: start,
            end_offset_sec: end,
            vector: self.vector,
        })
    }
}

/// A catalog entry from the index listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVideo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub system_metadata: SystemMetadata,
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit_per_page: u32,
    #[serde(rename = "total_page", default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u64,
}

/// One page of the video catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoPage {
    #[serde(default)]
    pub data: Vec<CatalogVideo>,
    #[serde(default)]
    pub page_info: PageInfo,
}

impl VideoPage {
    pub fn video_ids(&self) -> Vec<String> {
        self.data.iter().map(|v| v.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Query parameters for listing the catalog
#[derive(Debug, Clone)]
pub struct ListVideosParams {
    pub page: u32,
    pub page_limit: u32,
    pub sort_by: String,
    pub sort_option: SortOrder,
    pub filename: Option<String>,
}

impl Default for ListVideosParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_limit: 50,
            sort_by: "created_at".to_string(),
            sort_option: SortOrder::Desc,
            filename: None,
        }
    }
}

impl ListVideosParams {
    pub fn page(page: u32, page_limit: u32) -> Self {
        Self {
            page,
            page_limit,
            ..Self::default()
        }
    }
}
