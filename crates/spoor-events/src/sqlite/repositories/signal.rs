//! Signal repository — the append-only event log.
//!
//! Rows are immutable: there is no update or delete path. Insertion goes
//! through `INSERT OR IGNORE` keyed on `content_hash`, so concurrent
//! writers racing on the same envelope both succeed and exactly one row
//! lands.

use rusqlite::{Connection, OptionalExtension, params};

use crate::envelope::Envelope;
use crate::errors::Result;
use crate::sqlite::row_types::SignalRow;

const COLUMNS: &str =
    "seq, event_id, type, source, subject, time, datacontenttype, payload, content_hash";

/// Signal repository — stateless, every method takes `&Connection`.
pub struct SignalRepo;

impl SignalRepo {
    /// Insert an envelope, ignoring duplicates by content hash.
    ///
    /// Returns `true` if a row was inserted, `false` if the hash already
    /// existed (duplicate append, a no-op by design).
    pub fn insert_or_ignore(
        conn: &Connection,
        envelope: &Envelope,
        content_hash: &str,
    ) -> Result<bool> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO signals
             (event_id, type, source, subject, time, datacontenttype, payload, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                envelope.id.as_str(),
                envelope.event_type.as_str(),
                envelope.source,
                envelope.subject,
                envelope.time,
                envelope.datacontenttype,
                envelope.to_json()?,
                content_hash,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Get a signal by its content hash.
    pub fn get_by_hash(conn: &Connection, content_hash: &str) -> Result<Option<SignalRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM signals WHERE content_hash = ?1"),
                params![content_hash],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get all signals with `seq` greater than the watermark, in append order.
    pub fn get_since(conn: &Connection, seq: i64, limit: Option<i64>) -> Result<Vec<SignalRow>> {
        let mut sql = format!("SELECT {COLUMNS} FROM signals WHERE seq > ?1 ORDER BY seq ASC");
        if let Some(limit) = limit {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![seq], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get signals produced in `[from, to)`, in append order.
    pub fn get_in_window(conn: &Connection, from: &str, to: &str) -> Result<Vec<SignalRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM signals WHERE time >= ?1 AND time < ?2 ORDER BY seq ASC"
        ))?;
        let rows = stmt
            .query_map(params![from, to], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get signals whose type starts with `prefix`, in append order.
    pub fn get_by_type_prefix(
        conn: &Connection,
        prefix: &str,
        limit: Option<i64>,
    ) -> Result<Vec<SignalRow>> {
        let mut sql = format!(
            "SELECT {COLUMNS} FROM signals WHERE type LIKE ?1 || '%' ORDER BY seq ASC"
        );
        if let Some(limit) = limit {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![prefix], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count signals whose type starts with `prefix`.
    pub fn count_by_type_prefix(conn: &Connection, prefix: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM signals WHERE type LIKE ?1 || '%'",
            params![prefix],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count signals of an exact type.
    pub fn count_by_type(conn: &Connection, event_type: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM signals WHERE type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The most recent `limit` signals, newest first.
    pub fn recent(conn: &Connection, limit: i64) -> Result<Vec<SignalRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM signals ORDER BY seq DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest `seq` in the log (0 when empty).
    pub fn max_seq(conn: &Connection) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row("SELECT MAX(seq) FROM signals", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0))
    }

    fn map_row(row: &rusqlite::Row<'_>) -> std::result::Result<SignalRow, rusqlite::Error> {
        Ok(SignalRow {
            seq: row.get(0)?,
            event_id: row.get(1)?,
            event_type: row.get(2)?,
            source: row.get(3)?,
            subject: row.get(4)?,
            time: row.get(5)?,
            datacontenttype: row.get(6)?,
            payload: row.get(7)?,
            content_hash: row.get(8)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
