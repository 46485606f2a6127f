//! CloudEvent-style signal envelope.
//!
//! Every record in the signal log is an [`Envelope`]: a small fixed header
//! (`specversion`, `id`, `type`, `source`, `subject`, `time`,
//! `datacontenttype`) around a JSON `data` payload. The envelope's content
//! hash — SHA-256 of its canonical JSON — is the dedup key for the log:
//! appending a byte-identical envelope twice stores it once.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use spoor_core::EventId;

use crate::errors::Result;
use crate::hash::hash_json;
use crate::types::event_type::EventType;

/// CloudEvents spec version emitted by this crate.
pub const SPEC_VERSION: &str = "1.0";

/// Content type for JSON payloads.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A signal envelope as persisted to the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// CloudEvents spec version (always `"1.0"`).
    pub specversion: String,
    /// Unique envelope ID (UUID v7, time-ordered).
    pub id: EventId,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Producing component (e.g. an agent ID or `"spoor_reaper"`).
    pub source: String,
    /// Routing subject.
    pub subject: String,
    /// Production time (RFC 3339).
    pub time: String,
    /// Payload content type (always `"application/json"`).
    pub datacontenttype: String,
    /// Event payload.
    pub data: Value,
}

impl Envelope {
    /// Build a new envelope with a fresh ID and the current UTC time.
    #[must_use]
    pub fn new(event_type: EventType, source: &str, subject: &str, data: Value) -> Self {
        Self {
            specversion: SPEC_VERSION.to_string(),
            id: EventId::new(),
            event_type,
            source: source.to_string(),
            subject: subject.to_string(),
            time: chrono::Utc::now().to_rfc3339(),
            datacontenttype: CONTENT_TYPE_JSON.to_string(),
            data,
        }
    }

    /// SHA-256 of this envelope's canonical JSON.
    ///
    /// The hash covers every field, so two envelopes collide only when they
    /// are the same record. Identical re-appends (retries, crash-recovery
    /// replays) dedup; distinct records never do.
    pub fn content_hash(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        hash_json(&value)
    }

    /// Serialize to the canonical JSON string stored in the log.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an envelope from its stored JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
