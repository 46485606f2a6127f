//! Protocol error types.
//!
//! Denials (blocked gates, tamper alerts, invalid payloads) are values in
//! [`crate::engine::PhaseReply`], not errors. `ProtocolError` covers only
//! genuine failures: the storage layer misbehaving underneath the engine.

use thiserror::Error;

/// Errors from the protocol engine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Storage layer failure.
    #[error(transparent)]
    Store(#[from] spoor_events::StoreError),
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts() {
        let inner = spoor_events::StoreError::SignalNotFound("abc".into());
        let err: ProtocolError = inner.into();
        assert!(err.to_string().contains("abc"));
    }
}
