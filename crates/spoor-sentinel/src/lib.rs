//! # spoor-sentinel
//!
//! Immune system for the signal log: the watchdog classifies anomalies
//! (A1–A7) over a scan window, the reaper closes orphaned sessions with
//! synthetic failure yields, and the daemon runs both on intervals behind
//! a single-instance file lock.

#![deny(unsafe_code)]

pub mod daemon;
pub mod errors;
pub mod lock;
pub mod reaper;
pub mod watchdog;

pub use daemon::{DaemonConfig, run};
pub use errors::{Result, SentinelError};
pub use lock::{ExclusiveLock, LockMetadata};
pub use reaper::{ORPHAN_REASON, Orphan, ReapReport, Reaper};
pub use watchdog::{Thresholds, Watchdog};
