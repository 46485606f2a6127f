//! Per-identity hash-chained journal.
//!
//! Each identity owns an independent chain: every entry links to its
//! predecessor via `chain_hash = H(content ‖ parent_hash)`, with the first
//! entry anchored at the `GENESIS` sentinel. Content is deduplicated per
//! identity by `content_hash = H(content)`, so re-recording the same note
//! is rejected rather than silently forked.

use chrono::{Duration, Utc};
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::hash::sha256_hex;
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::repositories::journal::JournalRepo;
use crate::sqlite::row_types::JournalRow;

/// Parent-hash sentinel for the first entry of a chain.
pub const GENESIS: &str = "GENESIS";

/// Entry types accepted by the journal.
pub const ENTRY_TYPES: [&str; 7] = [
    "memory", "insight", "decision", "artifact", "attack", "delivery", "note",
];

/// Result of a full chain verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainReport {
    /// Whether every link recomputed cleanly.
    pub valid: bool,
    /// Total entries inspected.
    pub total: i64,
    /// Row IDs of every broken entry, oldest first.
    pub broken_at: Vec<i64>,
}

/// A recency tier of the journal ladder.
#[derive(Clone, Debug)]
pub struct LadderTier {
    /// Tier label (`"last_hour"`, `"last_day"`, ...).
    pub label: &'static str,
    /// Entries in this tier, oldest first.
    pub entries: Vec<JournalRow>,
}

/// Journal store wrapping a connection pool.
pub struct JournalStore {
    pool: ConnectionPool,
}

impl JournalStore {
    /// Create a new `JournalStore` with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Append an entry to an identity's chain.
    ///
    /// Rejects duplicate content per identity and unknown entry types. The
    /// chain link is derived from the current head at write time.
    #[instrument(skip(self, content))]
    pub fn write(&self, identity: &str, entry_type: &str, content: &str) -> Result<JournalRow> {
        if identity.trim().is_empty() {
            return Err(StoreError::InvalidOperation(
                "journal identity must not be empty".into(),
            ));
        }
        if content.trim().is_empty() {
            return Err(StoreError::InvalidOperation(
                "journal content must not be empty".into(),
            ));
        }
        if !ENTRY_TYPES.contains(&entry_type) {
            return Err(StoreError::InvalidOperation(format!(
                "unknown journal entry type: {entry_type}"
            )));
        }

        let content_hash = sha256_hex(content);
        let conn = self.conn()?;

        if JournalRepo::exists(&conn, identity, &content_hash)? {
            return Err(StoreError::DuplicateContent {
                identity: identity.to_string(),
                content_hash,
            });
        }

        let parent_hash = match JournalRepo::head(&conn, identity)? {
            Some(head) => head.chain_hash,
            None => GENESIS.to_string(),
        };
        let chain_hash = sha256_hex(&format!("{content}{parent_hash}"));
        let timestamp = Utc::now().to_rfc3339();

        let id = JournalRepo::insert(
            &conn,
            identity,
            entry_type,
            content,
            &content_hash,
            &parent_hash,
            &chain_hash,
            &timestamp,
        )?;
        debug!(id, identity, entry_type, "journal entry written");

        Ok(JournalRow {
            id,
            identity: identity.to_string(),
            entry_type: entry_type.to_string(),
            content: content.to_string(),
            content_hash,
            parent_hash,
            chain_hash,
            timestamp,
        })
    }

    /// The newest entry for an identity, or `None` for a fresh chain.
    pub fn head(&self, identity: &str) -> Result<Option<JournalRow>> {
        let conn = self.conn()?;
        JournalRepo::head(&conn, identity)
    }

    /// Every entry for an identity, oldest first.
    pub fn entries(&self, identity: &str) -> Result<Vec<JournalRow>> {
        let conn = self.conn()?;
        JournalRepo::all(&conn, identity)
    }

    /// Recompute every link in an identity's chain.
    ///
    /// Walks oldest-to-newest, checking the content hash, the parent link
    /// and the chain hash of each entry. Every mismatching row is collected;
    /// the walk keeps going so a report names all of the damage, not just
    /// the first break.
    #[instrument(skip(self))]
    pub fn verify(&self, identity: &str) -> Result<ChainReport> {
        let rows = self.entries(identity)?;
        let total = rows.len() as i64;
        let mut expected_parent = GENESIS.to_string();
        let mut broken_at = Vec::new();

        for row in &rows {
            let content_ok = sha256_hex(&row.content) == row.content_hash;
            let parent_ok = row.parent_hash == expected_parent;
            let chain_ok = sha256_hex(&format!("{}{}", row.content, row.parent_hash))
                == row.chain_hash;
            if !(content_ok && parent_ok && chain_ok) {
                broken_at.push(row.id);
            }
            // Later rows are checked against the stored hash, not a
            // recomputed one.
            expected_parent.clone_from(&row.chain_hash);
        }

        Ok(ChainReport {
            valid: broken_at.is_empty(),
            total,
            broken_at,
        })
    }

    /// Bucket an identity's entries into non-overlapping recency tiers:
    /// last hour, last day, last 7 days, last 30 days.
    pub fn ladder(&self, identity: &str) -> Result<Vec<LadderTier>> {
        let now = Utc::now();
        let cuts = [
            ("last_hour", now - Duration::hours(1), now + Duration::hours(1)),
            ("last_day", now - Duration::days(1), now - Duration::hours(1)),
            ("last_week", now - Duration::days(7), now - Duration::days(1)),
            ("last_month", now - Duration::days(30), now - Duration::days(7)),
        ];

        let conn = self.conn()?;
        let mut tiers = Vec::with_capacity(cuts.len());
        for (label, from, to) in cuts {
            let entries = JournalRepo::in_window(
                &conn,
                identity,
                &from.to_rfc3339(),
                &to.to_rfc3339(),
            )?;
            tiers.push(LadderTier { label, entries });
        }
        Ok(tiers)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connection::{self, ConnectionConfig};
    use crate::sqlite::migrations::run_migrations;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn store() -> JournalStore {
        let pool = connection::new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        JournalStore::new(pool)
    }

    #[test]
    fn first_entry_anchors_at_genesis() {
        let store = store();
        let entry = store.write("crow", "note", "first observation").unwrap();
        assert_eq!(entry.parent_hash, GENESIS);
        assert_eq!(entry.content_hash, sha256_hex("first observation"));
        assert_eq!(
            entry.chain_hash,
            sha256_hex(&format!("first observation{GENESIS}"))
        );
    }

    #[test]
    fn entries_chain_from_previous_head() {
        let store = store();
        let first = store.write("crow", "note", "one").unwrap();
        let second = store.write("crow", "insight", "two").unwrap();
        assert_eq!(second.parent_hash, first.chain_hash);
    }

    #[test]
    fn duplicate_content_is_rejected_per_identity() {
        let store = store();
        let _ = store.write("crow", "note", "same words").unwrap();
        let err = store.write("crow", "note", "same words").unwrap_err();
        assert_matches!(err, StoreError::DuplicateContent { ref identity, .. } if identity == "crow");

        // Same content under another identity is a separate chain.
        let other = store.write("spider", "note", "same words").unwrap();
        assert_eq!(other.parent_hash, GENESIS);
    }

    #[test]
    fn unknown_entry_type_is_rejected() {
        let store = store();
        let err = store.write("crow", "rant", "whatever").unwrap_err();
        assert_matches!(err, StoreError::InvalidOperation(_));
    }

    #[test]
    fn blank_identity_and_content_are_rejected() {
        let store = store();
        assert_matches!(
            store.write("  ", "note", "x").unwrap_err(),
            StoreError::InvalidOperation(_)
        );
        assert_matches!(
            store.write("crow", "note", " ").unwrap_err(),
            StoreError::InvalidOperation(_)
        );
    }

    #[test]
    fn verify_empty_chain_is_valid() {
        let store = store();
        let report = store.verify("crow").unwrap();
        assert_eq!(
            report,
            ChainReport {
                valid: true,
                total: 0,
                broken_at: vec![]
            }
        );
    }

    #[test]
    fn verify_intact_chain() {
        let store = store();
        for i in 0..5 {
            let _ = store.write("crow", "note", &format!("entry {i}")).unwrap();
        }
        let report = store.verify("crow").unwrap();
        assert!(report.valid);
        assert_eq!(report.total, 5);
        assert!(report.broken_at.is_empty());
    }

    #[test]
    fn verify_detects_content_tampering() {
        let store = store();
        let _ = store.write("crow", "note", "original").unwrap();
        let target = store.write("crow", "note", "will be edited").unwrap();
        let _ = store.write("crow", "note", "after").unwrap();

        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE journal SET content = 'edited' WHERE id = ?1",
                rusqlite::params![target.id],
            )
            .unwrap();
        }

        let report = store.verify("crow").unwrap();
        assert!(!report.valid);
        assert_eq!(report.broken_at, vec![target.id]);
    }

    #[test]
    fn verify_reports_every_broken_entry() {
        let store = store();
        let first = store.write("crow", "note", "one").unwrap();
        let _ = store.write("crow", "note", "two").unwrap();
        let third = store.write("crow", "note", "three").unwrap();
        let _ = store.write("crow", "note", "four").unwrap();

        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE journal SET content = 'edited' WHERE id IN (?1, ?2)",
                rusqlite::params![first.id, third.id],
            )
            .unwrap();
        }

        let report = store.verify("crow").unwrap();
        assert!(!report.valid);
        assert_eq!(report.total, 4);
        assert_eq!(report.broken_at, vec![first.id, third.id]);
    }

    #[test]
    fn verify_detects_relinked_parent() {
        let store = store();
        let first = store.write("crow", "note", "one").unwrap();
        let _ = store.write("crow", "note", "two").unwrap();
        let third = store.write("crow", "note", "three").unwrap();

        // Splice entry three to point past entry two.
        {
            let conn = store.conn().unwrap();
            let chain = sha256_hex(&format!("three{}", first.chain_hash));
            conn.execute(
                "UPDATE journal SET parent_hash = ?1, chain_hash = ?2 WHERE id = ?3",
                rusqlite::params![first.chain_hash, chain, third.id],
            )
            .unwrap();
        }

        let report = store.verify("crow").unwrap();
        assert!(!report.valid);
        assert_eq!(report.broken_at, vec![third.id]);
    }

    #[test]
    fn head_follows_writes() {
        let store = store();
        assert!(store.head("crow").unwrap().is_none());
        let _ = store.write("crow", "note", "one").unwrap();
        let last = store.write("crow", "note", "two").unwrap();
        assert_eq!(store.head("crow").unwrap().unwrap().id, last.id);
    }

    #[test]
    fn ladder_places_fresh_entries_in_last_hour() {
        let store = store();
        let _ = store.write("crow", "note", "fresh").unwrap();

        let tiers = store.ladder("crow").unwrap();
        assert_eq!(tiers.len(), 4);
        assert_eq!(tiers[0].label, "last_hour");
        assert_eq!(tiers[0].entries.len(), 1);
        assert!(tiers[1..].iter().all(|t| t.entries.is_empty()));
    }

    #[test]
    fn ladder_tiers_do_not_overlap() {
        let store = store();
        let entry = store.write("crow", "note", "old").unwrap();
        let stale = (Utc::now() - Duration::hours(5)).to_rfc3339();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE journal SET timestamp = ?1 WHERE id = ?2",
                rusqlite::params![stale, entry.id],
            )
            .unwrap();
        }

        let tiers = store.ladder("crow").unwrap();
        let placed: usize = tiers.iter().map(|t| t.entries.len()).sum();
        assert_eq!(placed, 1);
        assert_eq!(tiers[1].label, "last_day");
        assert_eq!(tiers[1].entries.len(), 1);
    }

    proptest! {
        #[test]
        fn any_sequence_of_distinct_writes_verifies(contents in proptest::collection::vec("[a-z]{1,16}", 1..12)) {
            let store = store();
            let mut seen = std::collections::HashSet::new();
            for content in contents {
                if seen.insert(content.clone()) {
                    store.write("crow", "note", &content).unwrap();
                }
            }
            let report = store.verify("crow").unwrap();
            prop_assert!(report.valid);
            prop_assert_eq!(report.total, seen.len() as i64);
        }
    }
}
