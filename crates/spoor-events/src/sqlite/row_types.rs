//! Raw row structs mirroring the database schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;
use crate::errors::Result;

/// A row from the `signals` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    /// Monotonic append order (SQLite rowid).
    pub seq: i64,
    /// Envelope ID.
    pub event_id: String,
    /// Event type wire string.
    pub event_type: String,
    /// Producing component.
    pub source: String,
    /// Routing subject.
    pub subject: String,
    /// Production time (RFC 3339).
    pub time: String,
    /// Payload content type.
    pub datacontenttype: String,
    /// Full envelope JSON as stored.
    pub payload: String,
    /// Dedup key.
    pub content_hash: String,
}

impl SignalRow {
    /// Parse the stored envelope.
    pub fn envelope(&self) -> Result<Envelope> {
        Envelope::from_json(&self.payload)
    }

    /// Parse just the envelope `data` field.
    pub fn data(&self) -> Result<Value> {
        let value: Value = serde_json::from_str(&self.payload)?;
        Ok(value.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// A row from the `journal` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRow {
    /// Chain position (SQLite rowid, ascending per identity).
    pub id: i64,
    /// Owning identity.
    pub identity: String,
    /// Entry classification (`memory`, `insight`, `decision`, ...).
    pub entry_type: String,
    /// Entry content.
    pub content: String,
    /// SHA-256 of `content`.
    pub content_hash: String,
    /// Previous entry's chain hash, or `"GENESIS"`.
    pub parent_hash: String,
    /// SHA-256 of `content` concatenated with `parent_hash`.
    pub chain_hash: String,
    /// Write time (RFC 3339).
    pub timestamp: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
