//! Error types for the footage pipeline

use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum FootageError {
    /// Video or catalog page absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Analysis service or vector store unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Video has no usable vector of the required kind
    #[error("No embedding: {0}")]
    NoEmbedding(String),

    /// Vector dimensionality does not match the collection
    #[error("Schema mismatch: expected {expected} dimensions, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// Some videos in a batch failed; the batch itself completed
    #[error("Partial batch failure: {failed} of {total} videos failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FootageError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        FootageError::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        FootageError::UpstreamUnavailable(msg.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        FootageError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn no_embedding(msg: impl Into<String>) -> Self {
        FootageError::NoEmbedding(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        FootageError::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FootageError::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        FootageError::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        FootageError::Internal(msg.into())
    }

    /// True for errors that come from talking to a remote service
    /// (transport failures and non-success statuses).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            FootageError::UpstreamUnavailable(_) | FootageError::Api { .. }
        )
    }
}

/// Result type alias for pipeline operations
pub type FootageResult<T> = Result<T, FootageError>;
