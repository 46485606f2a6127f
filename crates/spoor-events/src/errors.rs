//! Error types for the storage subsystem.
//!
//! [`StoreError`] is the primary error type returned by all signal-store and
//! journal operations. It provides specific variants for common failure modes
//! while keeping the surface area small enough for exhaustive pattern
//! matching. Note that a duplicate *signal* append is not an error (the store
//! reports it as a no-op success); [`StoreError::DuplicateContent`] is raised
//! only by journal writes, where repeated content per identity is rejected.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested signal was not found.
    #[error("signal not found: {0}")]
    SignalNotFound(String),

    /// Journal write rejected: this identity already holds this content.
    #[error("duplicate journal content for {identity}: {content_hash}")]
    DuplicateContent {
        /// Journal identity that already holds the content.
        identity: String,
        /// Hash of the rejected content.
        content_hash: String,
    },

    /// Invalid operation on the store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal error (e.g. poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn serde_error_display() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = StoreError::Serde(serde_err);
        assert!(err.to_string().contains("serde error"));
    }

    #[test]
    fn migration_error_display() {
        let err = StoreError::Migration {
            message: "v001 failed: table already exists".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration error: v001 failed: table already exists"
        );
    }

    #[test]
    fn signal_not_found_display() {
        let err = StoreError::SignalNotFound("sig-123".into());
        assert_eq!(err.to_string(), "signal not found: sig-123");
    }

    #[test]
    fn duplicate_content_display() {
        let err = StoreError::DuplicateContent {
            identity: "crow".into(),
            content_hash: "abc123".into(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate journal content for crow: abc123"
        );
    }

    #[test]
    fn invalid_operation_display() {
        let err = StoreError::InvalidOperation("cannot rewrite history".into());
        assert_eq!(err.to_string(), "invalid operation: cannot rewrite history");
    }

    #[test]
    fn from_rusqlite_error() {
        let sqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let err: StoreError = sqlite_err.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: StoreError = serde_err.into();
        assert!(matches!(err, StoreError::Serde(_)));
    }

    #[test]
    fn result_alias() {
        fn example() -> Result<String> {
            Ok("hello".into())
        }
        assert_eq!(example().unwrap(), "hello");
    }
}
