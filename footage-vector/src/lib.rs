//! Vector storage and nearest-neighbour search for video embeddings
//!
//! This crate owns the collection schema and turns video segments into
//! deterministically identified vector records.
//!
//! ## Features
//! - Cosine similarity between embeddings
//! - Idempotent upsert keyed by (video id, embedding option, scope)
//! - Weaviate backend over REST/GraphQL
//! - In-memory backend for tests and dry runs

pub mod backend;
pub mod memory;
pub mod record;
pub mod similarity;
pub mod store;
pub mod weaviate;

pub use backend::{
    CollectionSchema, HnswConfig, Neighbor, PropertyFilter, PropertySpec, VectorBackend,
};
pub use memory::InMemoryBackend;
pub use record::{record_id, RecordProperties, VectorRecord};
pub use similarity::{cosine_distance, cosine_similarity};
pub use store::{CollectionStats, UpsertReport, VideoVectorStore, DEFAULT_COLLECTION};
pub use weaviate::{WeaviateBackend, WeaviateConfig};
