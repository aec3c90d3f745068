//! Vector records and their deterministic identity

use footage_core::{EmbeddingOption, EmbeddingScope, Segment, SimilarVideo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored properties of a vector record (everything except the vector)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordProperties {
    pub video_id: String,
    pub filename: String,
    /// Video duration in seconds
    pub duration: f64,
    pub embedding_type: EmbeddingOption,
    pub scope: EmbeddingScope,
    pub start_time: f64,
    pub end_time: f64,
}

impl RecordProperties {
    pub fn to_similar_video(&self) -> SimilarVideo {
        let mut video = SimilarVideo::new(&self.video_id, &self.filename);
        video.embedding_type = Some(self.embedding_type);
        video.scope = Some(self.scope);
        video
    }
}

/// A record as written to the vector store
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: Uuid,
    pub properties: RecordProperties,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    pub fn from_segment(video_id: &str, filename: &str, duration: f64, segment: &Segment) -> Self {
        Self {
            id: record_id(video_id, segment.option, segment.scope),
            properties: RecordProperties {
                video_id: video_id.to_string(),
                filename: filename.to_string(),
                duration,
                embedding_type: segment.option,
                scope: segment.scope,
                start_time: segment.start_offset_sec,
                end_time: segment.end_offset_sec,
            },
            vector: segment.vector.clone(),
        }
    }
}

/// Deterministic record id for one logical segment of a video.
///
/// UUIDv5 in the DNS namespace over `"{video_id}_{option}_{scope}"`, so the
/// same segment always lands on the same record and re-ingesting overwrites.
pub fn record_id(video_id: &str, option: EmbeddingOption, scope: EmbeddingScope) -> Uuid {
    let name = format!("{}_{}_{}", video_id, option.as_str(), scope.as_str());
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}
