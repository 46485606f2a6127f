//! Daemon loops.
//!
//! Runs the watchdog and the reaper on independent intervals inside one
//! process. A tick that fails logs the error and waits for the next tick;
//! the loops only stop when the task is dropped or the process exits.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::reaper::Reaper;
use crate::watchdog::Watchdog;

/// Daemon scheduling configuration.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Seconds between watchdog scans.
    pub watchdog_interval_secs: u64,
    /// Scan window handed to the watchdog, in seconds.
    pub watchdog_window_secs: u64,
    /// Seconds between reaper passes.
    pub reaper_interval_secs: u64,
    /// Age limit handed to the reaper, in hours.
    pub reaper_max_age_hours: f64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_secs: 300,
            watchdog_window_secs: 3600,
            reaper_interval_secs: 3600,
            reaper_max_age_hours: 24.0,
        }
    }
}

/// Run both loops forever. Callers hold the exclusive lock and decide when
/// to stop (usually by racing this future against a shutdown signal).
pub async fn run(watchdog: Watchdog, reaper: Reaper, config: DaemonConfig) {
    info!(?config, "daemon loops starting");

    let mut watchdog_tick = interval(Duration::from_secs(config.watchdog_interval_secs.max(1)));
    watchdog_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reaper_tick = interval(Duration::from_secs(config.reaper_interval_secs.max(1)));
    reaper_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = watchdog_tick.tick() => {
                match watchdog.report(config.watchdog_window_secs) {
                    Ok(findings) if findings.is_empty() => {
                        info!("watchdog scan clean");
                    }
                    Ok(findings) => {
                        info!(count = findings.len(), "watchdog scan found anomalies");
                    }
                    Err(err) => error!(%err, "watchdog scan failed"),
                }
            }
            _ = reaper_tick.tick() => {
                match reaper.reap(config.reaper_max_age_hours) {
                    Ok(report) => {
                        info!(
                            reaped = report.reaped,
                            total_orphans = report.total_orphans,
                            ratio_after = report.ratio_after,
                            "reaper pass complete"
                        );
                    }
                    Err(err) => error!(%err, "reaper pass failed"),
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spoor_core::AgentRegistry;
    use spoor_events::{ConnectionConfig, EventStore, run_migrations};
    use std::sync::Arc;

    fn components() -> (Arc<EventStore>, Watchdog, Reaper) {
        let pool = spoor_events::new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        let store = Arc::new(EventStore::new(pool));
        let watchdog = Watchdog::new(
            Arc::clone(&store),
            AgentRegistry::new(vec![]),
            crate::watchdog::Thresholds::default(),
            "spoor_watchdog",
        );
        let reaper = Reaper::new(Arc::clone(&store), "spoor_reaper", vec!["prey8.".into()]);
        (store, watchdog, reaper)
    }

    #[tokio::test]
    async fn loops_survive_their_first_ticks() {
        let (_store, watchdog, reaper) = components();
        let config = DaemonConfig {
            watchdog_interval_secs: 1,
            watchdog_window_secs: 60,
            reaper_interval_secs: 1,
            reaper_max_age_hours: 24.0,
        };

        // First ticks fire immediately; the loop must still be alive after.
        let alive = tokio::time::timeout(
            Duration::from_millis(200),
            run(watchdog, reaper, config),
        )
        .await;
        assert!(alive.is_err(), "daemon loop returned unexpectedly");
    }
}
