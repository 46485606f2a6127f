//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

use spoor_core::AgentIdentity;

/// Root settings for a spoor deployment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoorSettings {
    /// Envelope `source` tag for records this process authors.
    pub source: String,
    /// Database connection settings.
    pub database: DatabaseSettings,
    /// Agent registry.
    pub registry: RegistrySettings,
    /// Watchdog thresholds and schedule.
    pub watchdog: WatchdogSettings,
    /// Reaper schedule and health-ratio scope.
    pub reaper: ReaperSettings,
}

/// Database connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the shared `SQLite` file.
    pub path: String,
    /// Maximum connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: crate::loader::spoor_dir()
                .join("signals.db")
                .to_string_lossy()
                .into_owned(),
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

/// The administered agent registry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Known agents and their allowed gates.
    pub agents: Vec<AgentIdentity>,
}

/// Watchdog thresholds and schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    /// A1: gate blocks per agent before a storm is flagged.
    pub gate_block_storm_threshold: usize,
    /// A2: tamper alerts in the window before a cluster is flagged.
    pub tamper_cluster_threshold: usize,
    /// A3: perceive-without-yield ratio above which orphans accumulate.
    pub orphan_ratio_threshold: f64,
    /// A6: perceives per agent before rapid fire is flagged.
    pub rapid_perceive_threshold: usize,
    /// Scan window in seconds.
    pub window_secs: u64,
    /// Seconds between daemon scans.
    pub interval_secs: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            gate_block_storm_threshold: 5,
            tamper_cluster_threshold: 3,
            orphan_ratio_threshold: 0.3,
            rapid_perceive_threshold: 5,
            window_secs: 3600,
            interval_secs: 300,
        }
    }
}

/// Reaper schedule and health-ratio scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperSettings {
    /// Age limit in hours before an open session counts as orphaned.
    pub max_age_hours: f64,
    /// Seconds between daemon passes.
    pub interval_secs: u64,
    /// Event-type prefixes counted in the yield:perceive health ratio.
    pub health_prefixes: Vec<String>,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            max_age_hours: 24.0,
            interval_secs: 3600,
            health_prefixes: vec!["prey8.".to_string()],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
