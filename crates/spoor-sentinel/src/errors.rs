//! Sentinel error types.

use thiserror::Error;

/// Errors from the watchdog, reaper and daemon machinery.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Storage layer failure.
    #[error(transparent)]
    Store(#[from] spoor_events::StoreError),

    /// Filesystem failure (lock file handling).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure (lock metadata).
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Another instance already holds the exclusive lock.
    #[error("lock at {path} held by pid {pid} since {started_at}")]
    LockHeld {
        /// Lock file path.
        path: String,
        /// Holder's process ID.
        pid: u32,
        /// When the holder acquired the lock (RFC 3339).
        started_at: String,
    },
}

/// Result alias for sentinel operations.
pub type Result<T> = std::result::Result<T, SentinelError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
