//! Append-only ingestion status log
//!
//! SQLite-backed. Every ingestion attempt appends one row; rows are never
//! updated or deleted. The current status of a video is its latest row.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use footage_core::{IngestStatus, StatusEvent};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Aggregate view of the log, one entry per video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Distinct videos seen
    pub total: usize,
    pub stored: usize,
    pub processing: usize,
    /// `failed` plus `error`
    pub failed: usize,
    pub skipped: usize,
    pub retrieved: usize,
    pub latest: BTreeMap<String, StatusEvent>,
}

pub struct StatusLedger {
    conn: Mutex<Connection>,
}

impl StatusLedger {
    /// Open (or create) the ledger database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, LedgerError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::Io(format!("Failed to create ledger directory: {}", e))
                })?;
            }
        }

        info!("Opening status ledger: {:?}", db_path.as_ref());
        let conn = Connection::open(db_path)?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.init_schema()?;
        Ok(ledger)
    }

    /// In-memory ledger (useful for testing and dry runs)
    pub fn new_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS status_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_ms INTEGER NOT NULL,
                video_id TEXT NOT NULL,
                status TEXT NOT NULL,
                task_id TEXT,
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_status_events_video
            ON status_events(video_id, timestamp_ms);
            "#,
        )?;

        Ok(())
    }

    /// Append one event
    pub fn append(&self, event: &StatusEvent) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockError)?;

        conn.execute(
            "INSERT INTO status_events (timestamp_ms, video_id, status, task_id, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.timestamp.timestamp_millis(),
                event.video_id,
                event.status.as_str(),
                event.task_id,
                event.error,
            ],
        )?;

        Ok(())
    }

    /// Append and log, never failing the caller.
    ///
    /// Ledger write failures are logged; ingestion carries on.
    pub fn record(&self, event: StatusEvent) -> StatusEvent {
        match event.status {
            IngestStatus::Failed | IngestStatus::Error => error!(
                "Video {} -> {}: {}",
                event.video_id,
                event.status,
                event.error.as_deref().unwrap_or("")
            ),
            _ => info!("Video {} -> {}", event.video_id, event.status),
        }

        if let Err(e) = self.append(&event) {
            error!("Failed to append status event for {}: {}", event.video_id, e);
        }
        event
    }

    /// All events in append order, optionally for one video
    pub fn events(&self, video_id: Option<&str>) -> Result<Vec<StatusEvent>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::LockError)?;

        let mut stmt = conn.prepare(
            "SELECT timestamp_ms, video_id, status, task_id, error
             FROM status_events
             WHERE ?1 IS NULL OR video_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![video_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (timestamp_ms, video_id, status, task_id, error) = row?;
            events.push(StatusEvent {
                timestamp: DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
                    .ok_or_else(|| LedgerError::Corrupt(format!("bad timestamp {}", timestamp_ms)))?,
                video_id,
                status: status.parse().map_err(LedgerError::Corrupt)?,
                task_id,
                error,
            });
        }
        Ok(events)
    }

    /// Latest event per video: greatest timestamp, then latest append
    pub fn latest(&self) -> Result<BTreeMap<String, StatusEvent>, LedgerError> {
        let mut latest: BTreeMap<String, StatusEvent> = BTreeMap::new();
        for event in self.events(None)? {
            match latest.get(&event.video_id) {
                Some(current) if current.timestamp > event.timestamp => {}
                _ => {
                    latest.insert(event.video_id.clone(), event);
                }
            }
        }
        Ok(latest)
    }

    /// Fold the log into counts of current status per video
    pub fn summarize(&self) -> Result<LedgerSummary, LedgerError> {
        let latest = self.latest()?;
        let mut summary = LedgerSummary {
            total: latest.len(),
            ..LedgerSummary::default()
        };

        for event in latest.values() {
            match event.status {
                IngestStatus::Stored => summary.stored += 1,
                IngestStatus::Processing => summary.processing += 1,
                IngestStatus::Failed | IngestStatus::Error => summary.failed += 1,
                IngestStatus::Skipped => summary.skipped += 1,
                IngestStatus::Retrieved => summary.retrieved += 1,
            }
        }
        summary.latest = latest;
        Ok(summary)
    }

    /// Videos whose current status is `status`
    pub fn video_ids_with_status(&self, status: IngestStatus) -> Result<HashSet<String>, LedgerError> {
        Ok(self
            .latest()?
            .into_iter()
            .filter(|(_, event)| event.status == status)
            .map(|(video_id, _)| video_id)
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("Failed to acquire lock")]
    LockError,
}

impl From<LedgerError> for footage_core::FootageError {
    fn from(e: LedgerError) -> Self {
        footage_core::FootageError::storage(e.to_string())
    }
}
