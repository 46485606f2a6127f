//! Single-instance guard for the daemon.
//!
//! An advisory file lock (`fs2`) with PID metadata written into the file.
//! A second daemon pointed at the same lock path fails fast with an error
//! naming the holder, instead of silently double-scanning the log.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, SentinelError};

/// Metadata stored in the lock file while held.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Holder's process ID.
    pub pid: u32,
    /// When the lock was acquired (RFC 3339).
    pub started_at: String,
}

/// An exclusive advisory file lock, released on drop.
#[derive(Debug)]
pub struct ExclusiveLock {
    file: File,
    path: String,
}

impl ExclusiveLock {
    /// Acquire the lock, failing fast if another process holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            let mut contents = String::new();
            let _ = file.read_to_string(&mut contents);
            let holder: LockMetadata =
                serde_json::from_str(&contents).unwrap_or(LockMetadata {
                    pid: 0,
                    started_at: "unknown".into(),
                });
            return Err(SentinelError::LockHeld {
                path: path.display().to_string(),
                pid: holder.pid,
                started_at: holder.started_at,
            });
        }

        let metadata = LockMetadata {
            pid: std::process::id(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        file.set_len(0)?;
        let _ = file.seek(SeekFrom::Start(0))?;
        file.write_all(serde_json::to_string(&metadata)?.as_bytes())?;
        file.sync_all()?;
        debug!(path = %path.display(), pid = metadata.pid, "exclusive lock acquired");

        Ok(Self {
            file,
            path: path.display().to_string(),
        })
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        debug!(path = self.path, "exclusive lock released");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
