//! Core types for the footage similarity pipeline
//!
//! This crate defines the shared data structures used across the workspace:
//! video embeddings and their segments, ingestion status events, similarity
//! results, the error taxonomy and the interfaces of the external
//! video-understanding service.

pub mod error;
pub mod response;
pub mod service;
pub mod similar;
pub mod status;
pub mod video;

pub use error::{FootageError, FootageResult};
pub use response::ApiResponse;
pub use service::{EmbeddingApi, MetadataStore, UserMetadata, VideoCatalog};
pub use similar::{ResultSource, SimilarVideo, SimilarityResult};
pub use status::{IngestStatus, StatusEvent};
pub use video::{
    CatalogVideo, EmbeddingFetch, EmbeddingOption, EmbeddingScope, ListVideosParams, PageInfo,
    RawEmbedding, RawSegment, RawVideoEmbedding, Segment, SortOrder, SystemMetadata,
    VideoEmbedding, VideoPage, VideoWithEmbeddings,
};
