//! Ingestion and similarity services for the footage pipeline
//!
//! This crate orchestrates the analysis-service client and the vector store:
//! fetching embeddings, batch ingestion, the status ledger and the
//! cache-aside similarity query path.

pub mod batch_ingest;
pub mod embedding_source;
pub mod pacer;
pub mod similarity_cache;
pub mod status_ledger;

pub use batch_ingest::{
    BatchIngestor, BatchOptions, BatchReport, BatchSummary, DedupSource, IngestOutcome,
    MAX_PAGE_SIZE,
};
pub use embedding_source::EmbeddingSourceClient;
pub use pacer::Pacer;
pub use similarity_cache::{
    CacheInspection, CachedSimilar, RepresentativeChoice, SegmentSummary, SimilarityCache,
    SimilarityCacheConfig, SimilarityDiagnostics, CACHE_LIST_KEY, CACHE_TIMESTAMP_KEY,
    DEFAULT_TTL_SECS,
};
pub use status_ledger::{LedgerError, LedgerSummary, StatusLedger};
