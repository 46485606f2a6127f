//! Content hashing helpers.
//!
//! All hashes in the system are SHA-256 hex digests. JSON values are hashed
//! in canonical form: `serde_json` object maps are `BTreeMap`-backed, so
//! serializing a [`Value`] always emits keys in sorted order. Hashing the
//! serialized `Value` therefore gives the same digest regardless of the
//! field order the producer used.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::Result;

/// SHA-256 hex digest of a byte string.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

/// SHA-256 hex digest of a JSON value in canonical (sorted-key) form.
pub fn hash_json(value: &Value) -> Result<String> {
    let canonical = serde_json::to_string(value)?;
    Ok(sha256_hex(&canonical))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
