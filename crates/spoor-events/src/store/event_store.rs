//! High-level `EventStore` API over the append-only signal log.
//!
//! The log is the shared medium every component writes to and reads from.
//! Appends are content-addressed: a SHA-256 over the envelope's canonical
//! JSON is the dedup key, so retried or replayed appends of the same record
//! are no-op successes rather than duplicates.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::envelope::Envelope;
use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::repositories::signal::SignalRepo;
use crate::sqlite::row_types::SignalRow;

/// Outcome of an append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Whether a new row was stored (`false` means duplicate content).
    pub stored: bool,
    /// The envelope's content hash.
    pub content_hash: String,
    /// Log sequence of the row holding this content.
    pub seq: i64,
}

/// Append-only event store wrapping a connection pool.
///
/// INVARIANT: the log never mutates in place. The only write path is
/// `INSERT OR IGNORE` keyed on content hash, so concurrent writers and
/// retries converge on one row per distinct record.
pub struct EventStore {
    pool: ConnectionPool,
}

impl EventStore {
    const SQLITE_BUSY_MAX_RETRIES: u32 = 32;

    /// Create a new `EventStore` with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Retry an operation on `SQLite` BUSY/LOCKED with linear backoff + jitter.
    ///
    /// Backoff: base = min(attempts * 10, 500) ms, jitter ±25% to prevent
    /// thundering herd when multiple writers contend on the same database.
    #[allow(clippy::unused_self)]
    fn retry_on_sqlite_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err)
                    if Self::is_sqlite_busy_or_locked(&err)
                        && attempts < Self::SQLITE_BUSY_MAX_RETRIES =>
                {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    let backoff_ms = base_ms.saturating_sub(jitter_range) + jitter;
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_sqlite_busy_or_locked(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => {
                matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Append an envelope to the log.
    ///
    /// Duplicate content (same hash) is a no-op success: the outcome reports
    /// `stored: false` and the sequence of the existing row.
    #[instrument(skip(self, envelope), fields(event_type = envelope.event_type.as_str()))]
    pub fn append(&self, envelope: &Envelope) -> Result<AppendOutcome> {
        let content_hash = envelope.content_hash()?;
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            let stored = SignalRepo::insert_or_ignore(&conn, envelope, &content_hash)?;
            let row = SignalRepo::get_by_hash(&conn, &content_hash)?
                .ok_or_else(|| StoreError::SignalNotFound(content_hash.clone()))?;
            if stored {
                debug!(seq = row.seq, "signal appended");
            } else {
                debug!(seq = row.seq, "duplicate signal ignored");
            }
            Ok(AppendOutcome {
                stored,
                content_hash: content_hash.clone(),
                seq: row.seq,
            })
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Get a signal by content hash.
    pub fn get_by_hash(&self, content_hash: &str) -> Result<Option<SignalRow>> {
        let conn = self.conn()?;
        SignalRepo::get_by_hash(&conn, content_hash)
    }

    /// Signals with `seq` past the watermark, in append order.
    pub fn get_since(&self, seq: i64, limit: Option<i64>) -> Result<Vec<SignalRow>> {
        let conn = self.conn()?;
        SignalRepo::get_since(&conn, seq, limit)
    }

    /// Signals produced in the RFC 3339 window `[from, to)`.
    pub fn get_in_window(&self, from: &str, to: &str) -> Result<Vec<SignalRow>> {
        let conn = self.conn()?;
        SignalRepo::get_in_window(&conn, from, to)
    }

    /// Signals whose type starts with `prefix`, in append order.
    pub fn get_by_type_prefix(&self, prefix: &str, limit: Option<i64>) -> Result<Vec<SignalRow>> {
        let conn = self.conn()?;
        SignalRepo::get_by_type_prefix(&conn, prefix, limit)
    }

    /// Count of signals whose type starts with `prefix`.
    pub fn count_by_type_prefix(&self, prefix: &str) -> Result<i64> {
        let conn = self.conn()?;
        SignalRepo::count_by_type_prefix(&conn, prefix)
    }

    /// Count of signals of an exact type.
    pub fn count_by_type(&self, event_type: &str) -> Result<i64> {
        let conn = self.conn()?;
        SignalRepo::count_by_type(&conn, event_type)
    }

    /// The most recent `limit` signals, newest first.
    pub fn recent(&self, limit: i64) -> Result<Vec<SignalRow>> {
        let conn = self.conn()?;
        SignalRepo::recent(&conn, limit)
    }

    /// Highest sequence in the log (0 when empty).
    pub fn max_seq(&self) -> Result<i64> {
        let conn = self.conn()?;
        SignalRepo::max_seq(&conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
