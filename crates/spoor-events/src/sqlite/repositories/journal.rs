//! Journal repository — per-identity hash-chained entries.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::JournalRow;

const COLUMNS: &str =
    "id, identity, entry_type, content, content_hash, parent_hash, chain_hash, timestamp";

/// Journal repository — stateless, every method takes `&Connection`.
pub struct JournalRepo;

impl JournalRepo {
    /// Insert a journal entry and return its row ID.
    ///
    /// The `(identity, content_hash)` unique constraint is enforced by the
    /// schema; callers translate the constraint violation into a domain
    /// error.
    pub fn insert(
        conn: &Connection,
        identity: &str,
        entry_type: &str,
        content: &str,
        content_hash: &str,
        parent_hash: &str,
        chain_hash: &str,
        timestamp: &str,
    ) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO journal
             (identity, entry_type, content, content_hash, parent_hash, chain_hash, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                identity,
                entry_type,
                content,
                content_hash,
                parent_hash,
                chain_hash,
                timestamp,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The newest entry for an identity, or `None` for a fresh chain.
    pub fn head(conn: &Connection, identity: &str) -> Result<Option<JournalRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM journal WHERE identity = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![identity],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Every entry for an identity, oldest first (chain order).
    pub fn all(conn: &Connection, identity: &str) -> Result<Vec<JournalRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM journal WHERE identity = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![identity], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Entries for an identity with timestamp in `[from, to)`, oldest first.
    pub fn in_window(
        conn: &Connection,
        identity: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<JournalRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM journal
             WHERE identity = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![identity, from, to], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether an identity already holds an entry with this content hash.
    pub fn exists(conn: &Connection, identity: &str, content_hash: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM journal WHERE identity = ?1 AND content_hash = ?2",
            params![identity, content_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Number of entries in an identity's chain.
    pub fn count(conn: &Connection, identity: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM journal WHERE identity = ?1",
            params![identity],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> std::result::Result<JournalRow, rusqlite::Error> {
        Ok(JournalRow {
            id: row.get(0)?,
            identity: row.get(1)?,
            entry_type: row.get(2)?,
            content: row.get(3)?,
            content_hash: row.get(4)?,
            parent_hash: row.get(5)?,
            chain_hash: row.get(6)?,
            timestamp: row.get(7)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn insert(conn: &Connection, identity: &str, n: u32, parent: &str) -> i64 {
        JournalRepo::insert(
            conn,
            identity,
            "note",
            &format!("entry {n}"),
            &format!("hash-{identity}-{n}"),
            parent,
            &format!("chain-{identity}-{n}"),
            &format!("2026-01-01T00:00:{n:02}+00:00"),
        )
        .unwrap()
    }

    #[test]
    fn insert_returns_row_id() {
        let conn = setup();
        let first = insert(&conn, "crow", 1, "GENESIS");
        let second = insert(&conn, "crow", 2, "chain-crow-1");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn head_of_empty_chain_is_none() {
        let conn = setup();
        assert!(JournalRepo::head(&conn, "crow").unwrap().is_none());
    }

    #[test]
    fn head_tracks_newest_entry() {
        let conn = setup();
        let _ = insert(&conn, "crow", 1, "GENESIS");
        let _ = insert(&conn, "crow", 2, "chain-crow-1");

        let head = JournalRepo::head(&conn, "crow").unwrap().unwrap();
        assert_eq!(head.content, "entry 2");
        assert_eq!(head.parent_hash, "chain-crow-1");
    }

    #[test]
    fn all_returns_chain_order() {
        let conn = setup();
        let _ = insert(&conn, "crow", 1, "GENESIS");
        let _ = insert(&conn, "crow", 2, "chain-crow-1");
        let _ = insert(&conn, "spider", 1, "GENESIS");

        let rows = JournalRepo::all(&conn, "crow").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "entry 1");
        assert_eq!(rows[1].content, "entry 2");
    }

    #[test]
    fn chains_are_isolated_per_identity() {
        let conn = setup();
        let _ = insert(&conn, "crow", 1, "GENESIS");
        let _ = insert(&conn, "spider", 1, "GENESIS");

        assert_eq!(JournalRepo::count(&conn, "crow").unwrap(), 1);
        assert_eq!(JournalRepo::count(&conn, "spider").unwrap(), 1);
        assert_eq!(JournalRepo::count(&conn, "husk").unwrap(), 0);
    }

    #[test]
    fn exists_checks_identity_scope() {
        let conn = setup();
        let _ = insert(&conn, "crow", 1, "GENESIS");

        assert!(JournalRepo::exists(&conn, "crow", "hash-crow-1").unwrap());
        assert!(!JournalRepo::exists(&conn, "spider", "hash-crow-1").unwrap());
    }

    #[test]
    fn duplicate_hash_violates_constraint() {
        let conn = setup();
        let _ = insert(&conn, "crow", 1, "GENESIS");
        let err = JournalRepo::insert(
            &conn,
            "crow",
            "note",
            "entry 1 again",
            "hash-crow-1",
            "chain-crow-1",
            "chain-crow-2",
            "2026-01-01T00:01:00+00:00",
        );
        assert!(err.is_err());
    }

    #[test]
    fn window_query_is_half_open() {
        let conn = setup();
        let _ = insert(&conn, "crow", 1, "GENESIS");
        let _ = insert(&conn, "crow", 2, "chain-crow-1");

        let rows = JournalRepo::in_window(
            &conn,
            "crow",
            "2026-01-01T00:00:01+00:00",
            "2026-01-01T00:00:02+00:00",
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "entry 1");
    }
}
