//! Similarity query results

use serde::{Deserialize, Serialize};

use crate::{EmbeddingOption, EmbeddingScope};

/// A neighbour of the query video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarVideo {
    pub video_id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_type: Option<EmbeddingOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<EmbeddingScope>,
    /// Cosine similarity (1 - distance) at computation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_percentage: Option<f64>,
}

impl SimilarVideo {
    pub fn new(video_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            filename: filename.into(),
            embedding_type: None,
            scope: None,
            similarity_score: None,
            similarity_percentage: None,
        }
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity_score = Some(similarity);
        self.similarity_percentage = Some((similarity * 10_000.0).round() / 100.0);
        self
    }
}

/// Where a similarity answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Cache,
    Fresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub video_id: String,
    pub similar_videos: Vec<SimilarVideo>,
    pub source: ResultSource,
    /// Age of the cache entry, set when `source == Cache`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_secs: Option<i64>,
    /// Scope of the vector the search ran with, set when `source == Fresh`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_scope: Option<EmbeddingScope>,
}

impl SimilarityResult {
    pub fn empty(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            similar_videos: Vec::new(),
            source: ResultSource::Fresh,
            cache_age_secs: None,
            query_scope: None,
        }
    }
}
