//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SpoorSettings::default()`]
//! 2. If `~/.spoor/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SPOOR_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::SpoorSettings;

/// Resolve the spoor home directory (`~/.spoor`).
pub fn spoor_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".spoor")
}

/// Resolve the path to the settings file (`~/.spoor/settings.json`).
pub fn settings_path() -> PathBuf {
    spoor_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SpoorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SpoorSettings> {
    let defaults = serde_json::to_value(SpoorSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SpoorSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules; invalid values are ignored with
/// a warning (falling back to file/default).
pub fn apply_env_overrides(settings: &mut SpoorSettings) {
    if let Some(v) = read_env_string("SPOOR_SOURCE") {
        settings.source = v;
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SPOOR_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = read_env_u32("SPOOR_POOL_SIZE", 1, 64) {
        settings.database.pool_size = v;
    }
    if let Some(v) = read_env_u32("SPOOR_BUSY_TIMEOUT_MS", 100, 60_000) {
        settings.database.busy_timeout_ms = v;
    }

    // ── Watchdog ────────────────────────────────────────────────────
    if let Some(v) = read_env_usize("SPOOR_WD_GATE_BLOCK_THRESHOLD", 1, 1_000) {
        settings.watchdog.gate_block_storm_threshold = v;
    }
    if let Some(v) = read_env_usize("SPOOR_WD_TAMPER_THRESHOLD", 1, 1_000) {
        settings.watchdog.tamper_cluster_threshold = v;
    }
    if let Some(v) = read_env_f64("SPOOR_WD_ORPHAN_RATIO", 0.0, 1.0) {
        settings.watchdog.orphan_ratio_threshold = v;
    }
    if let Some(v) = read_env_usize("SPOOR_WD_RAPID_PERCEIVE_THRESHOLD", 1, 1_000) {
        settings.watchdog.rapid_perceive_threshold = v;
    }
    if let Some(v) = read_env_u64("SPOOR_WD_WINDOW_SECS", 60, 604_800) {
        settings.watchdog.window_secs = v;
    }
    if let Some(v) = read_env_u64("SPOOR_WD_INTERVAL_SECS", 1, 86_400) {
        settings.watchdog.interval_secs = v;
    }

    // ── Reaper ──────────────────────────────────────────────────────
    if let Some(v) = read_env_f64("SPOOR_REAPER_MAX_AGE_HOURS", 0.01, 8_760.0) {
        settings.reaper.max_age_hours = v;
    }
    if let Some(v) = read_env_u64("SPOOR_REAPER_INTERVAL_SECS", 1, 86_400) {
        settings.reaper.interval_secs = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_f64(name: &str, min: f64, max: f64) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_f64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid f64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"b": 3});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_recurses_into_objects() {
        let target = serde_json::json!({"database": {"path": "a.db", "pool_size": 8}});
        let source = serde_json::json!({"database": {"pool_size": 2}});
        let merged = deep_merge(target, source);
        assert_eq!(
            merged,
            serde_json::json!({"database": {"path": "a.db", "pool_size": 2}})
        );
    }

    #[test]
    fn merge_replaces_arrays_wholesale() {
        let target = serde_json::json!({"prefixes": ["prey8."]});
        let source = serde_json::json!({"prefixes": ["alt."]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["prefixes"], serde_json::json!(["alt."]));
    }

    #[test]
    fn merge_skips_nulls() {
        let target = serde_json::json!({"source": "nest"});
        let source = serde_json::json!({"source": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["source"], "nest");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn u32_range_enforced() {
        assert_eq!(parse_u32_range("8", 1, 64), Some(8));
        assert_eq!(parse_u32_range("0", 1, 64), None);
        assert_eq!(parse_u32_range("65", 1, 64), None);
        assert_eq!(parse_u32_range("junk", 1, 64), None);
    }

    #[test]
    fn f64_range_enforced() {
        assert_eq!(parse_f64_range("0.3", 0.0, 1.0), Some(0.3));
        assert_eq!(parse_f64_range("1.5", 0.0, 1.0), None);
        assert_eq!(parse_f64_range("NaN", 0.0, 1.0), None);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.database.pool_size, 8);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"source": "nest", "registry": {{"agents": [
                {{"agent_id": "crow", "display_name": "Crow Scribe",
                  "allowed_gates": ["perceive", "react", "execute", "yield"]}}
            ]}}}}"#
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.source, "nest");
        assert_eq!(settings.registry.agents.len(), 1);
        assert_eq!(settings.registry.agents[0].agent_id, "crow");
        // Untouched sections stay at defaults.
        assert_eq!(settings.watchdog.window_secs, 3600);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }
}
