//! Ingestion status events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome recorded for one ingestion step of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Embedding fetched from the analysis service
    Retrieved,
    /// Vectors written to the store
    Stored,
    /// The service answered but nothing usable came back
    Failed,
    /// Transport failure or unexpected error
    Error,
    /// Already ingested, no work done
    Skipped,
    /// Analysis not finished upstream
    Processing,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Retrieved => "retrieved",
            IngestStatus::Stored => "stored",
            IngestStatus::Failed => "failed",
            IngestStatus::Error => "error",
            IngestStatus::Skipped => "skipped",
            IngestStatus::Processing => "processing",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, IngestStatus::Failed | IngestStatus::Error)
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IngestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retrieved" => Ok(IngestStatus::Retrieved),
            "stored" => Ok(IngestStatus::Stored),
            "failed" => Ok(IngestStatus::Failed),
            "error" => Ok(IngestStatus::Error),
            "skipped" => Ok(IngestStatus::Skipped),
            "processing" => Ok(IngestStatus::Processing),
            _ => Err(format!("Unknown ingest status: {}", s)),
        }
    }
}

/// One row of the append-only status log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub timestamp: DateTime<Utc>,
    pub video_id: String,
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    /// Create an event stamped with the current time
    pub fn new(video_id: impl Into<String>, status: IngestStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            video_id: video_id.into(),
            status,
            task_id: None,
            error: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
