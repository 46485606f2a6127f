//! # spoor-events
//!
//! Storage layer for the spoor coordination core:
//!
//! - **Signal log**: append-only, content-addressed event store. Envelopes
//!   are CloudEvent-shaped; the SHA-256 of the canonical envelope JSON is a
//!   unique key, so duplicate appends are no-op successes.
//! - **Identity journals**: per-identity hash chains with `GENESIS` anchors,
//!   full-chain verification, and a recency ladder.
//! - **`SQLite` backend**: `rusqlite` facade with repository pattern over an
//!   `r2d2` pool (WAL mode, busy retry with backoff).
//! - **Migrations**: version-tracked SQL schema evolution.

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod hash;
pub mod sqlite;
pub mod store;
pub mod types;

pub use envelope::Envelope;
pub use errors::{Result, StoreError};
pub use sqlite::connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use sqlite::migrations::run_migrations;
pub use sqlite::row_types::{JournalRow, SignalRow};
pub use store::event_store::{AppendOutcome, EventStore};
pub use store::journal_store::{ChainReport, ENTRY_TYPES, GENESIS, JournalStore, LadderTier};
pub use types::event_type::EventType;
pub use types::payloads::{
    EventData, ExecuteData, FindingData, GateBlockedData, ImmunizationStatus, PerceiveData,
    ReactData, SbeContract, Severity, TamperAlertData, YieldData,
};
