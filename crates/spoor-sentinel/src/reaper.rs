//! Orphan reaper.
//!
//! An orphan is a `prey8.perceive` older than the age limit whose session
//! never saw a `prey8.yield`. The reaper closes each one with a synthetic
//! failure yield (`immunization_status = FAILED`, `mutation_confidence = 0`,
//! `reason = "orphaned_timeout"`), which keeps the yield:perceive health
//! ratio honest without hiding the failure. Re-running is safe: sessions
//! that already hold any yield — agent-written or reaper-written — are
//! never touched again.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, trace};

use spoor_events::{
    Envelope, EventData, EventStore, ImmunizationStatus, SbeContract, SignalRow, YieldData,
};

use crate::errors::Result;

/// Close cause recorded on synthetic yields.
pub const ORPHAN_REASON: &str = "orphaned_timeout";

/// An open session past the age limit.
#[derive(Clone, Debug, Serialize)]
pub struct Orphan {
    /// Log sequence of the opening perceive.
    pub seq: i64,
    /// Orphaned session.
    pub session_id: String,
    /// Agent that opened it.
    pub agent_id: String,
    /// Probe recorded at perceive.
    pub probe: String,
    /// Age in hours at scan time.
    pub age_hours: f64,
}

/// Result of a reap pass.
#[derive(Clone, Debug, Serialize)]
pub struct ReapReport {
    /// Synthetic yields written this pass.
    pub reaped: usize,
    /// Orphans found by the scan.
    pub total_orphans: usize,
    /// Yield:perceive ratio (percent) before the pass.
    pub ratio_before: f64,
    /// Yield:perceive ratio (percent) after the pass.
    pub ratio_after: f64,
}

/// The orphan reaper.
pub struct Reaper {
    store: Arc<EventStore>,
    source: String,
    health_prefixes: Vec<String>,
}

impl Reaper {
    /// Create a new reaper.
    ///
    /// `health_prefixes` scopes both the orphan scan and the health ratio
    /// to event-type prefixes (normally `["prey8."]`).
    pub fn new(store: Arc<EventStore>, source: &str, health_prefixes: Vec<String>) -> Self {
        Self {
            store,
            source: source.to_string(),
            health_prefixes,
        }
    }

    fn session_of(row: &SignalRow) -> Option<String> {
        row.data()
            .ok()?
            .get("session_id")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn perceive_types(&self) -> impl Iterator<Item = String> + '_ {
        self.health_prefixes.iter().map(|p| format!("{p}perceive"))
    }

    fn yield_types(&self) -> impl Iterator<Item = String> + '_ {
        self.health_prefixes.iter().map(|p| format!("{p}yield"))
    }

    /// Yield:perceive ratio as a percentage.
    pub fn health_ratio(&self) -> Result<f64> {
        let mut perceives = 0;
        for t in self.perceive_types() {
            perceives += self.store.count_by_type(&t)?;
        }
        let mut yields = 0;
        for t in self.yield_types() {
            yields += self.store.count_by_type(&t)?;
        }
        #[allow(clippy::cast_precision_loss)]
        Ok(yields as f64 / perceives.max(1) as f64 * 100.0)
    }

    /// Find sessions opened more than `max_age_hours` ago and never closed.
    #[instrument(skip(self))]
    pub fn scan_orphans(&self, max_age_hours: f64) -> Result<Vec<Orphan>> {
        let now = Utc::now();

        let mut yield_sessions: BTreeSet<String> = BTreeSet::new();
        for t in self.yield_types() {
            for row in self.store.get_by_type_prefix(&t, None)? {
                if let Some(sid) = Self::session_of(&row) {
                    let _ = yield_sessions.insert(sid);
                }
            }
        }

        let mut orphans = Vec::new();
        for t in self.perceive_types() {
            for row in self.store.get_by_type_prefix(&t, None)? {
                let Ok(data) = row.data() else {
                    trace!(seq = row.seq, "skipping unparseable perceive");
                    continue;
                };
                let field = |key: &str| {
                    data.get(key)
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let session_id = field("session_id");
                if session_id.is_empty() || yield_sessions.contains(&session_id) {
                    continue;
                }

                let age_hours = DateTime::parse_from_rfc3339(&row.time)
                    .map(|ts| (now - ts.with_timezone(&Utc)).num_seconds() as f64 / 3600.0)
                    .unwrap_or(0.0);
                if age_hours >= max_age_hours {
                    orphans.push(Orphan {
                        seq: row.seq,
                        session_id,
                        agent_id: field("agent_id"),
                        probe: field("probe").chars().take(200).collect(),
                        age_hours,
                    });
                }
            }
        }
        Ok(orphans)
    }

    /// Close every orphan older than `max_age_hours` with a synthetic
    /// failure yield.
    #[instrument(skip(self))]
    pub fn reap(&self, max_age_hours: f64) -> Result<ReapReport> {
        let ratio_before = self.health_ratio()?;
        let orphans = self.scan_orphans(max_age_hours)?;

        let mut reaped = 0;
        for orphan in &orphans {
            let data = YieldData {
                agent_id: orphan.agent_id.clone(),
                session_id: orphan.session_id.clone(),
                token: String::new(),
                summary: format!(
                    "auto-closed orphaned session {} (age {:.1}h, probe: {})",
                    orphan.session_id, orphan.age_hours, orphan.probe
                ),
                immunization_status: ImmunizationStatus::Failed,
                mutation_confidence: 0,
                completion: Some(SbeContract {
                    given: format!("session {} perceived but never yielded", orphan.session_id),
                    when: format!("the reaper found it aged {:.1}h", orphan.age_hours),
                    then: "the session is closed with a failure yield".into(),
                }),
                reason: Some(ORPHAN_REASON.into()),
            };
            let envelope = Envelope::new(
                EventData::Yield(data.clone()).event_type(),
                &self.source,
                &format!("session/{}", orphan.session_id),
                EventData::Yield(data).to_value()?,
            );
            let outcome = self.store.append(&envelope)?;
            if outcome.stored {
                reaped += 1;
                info!(
                    session_id = orphan.session_id,
                    agent_id = orphan.agent_id,
                    age_hours = orphan.age_hours,
                    "orphan reaped"
                );
            }
        }

        Ok(ReapReport {
            reaped,
            total_orphans: orphans.len(),
            ratio_before,
            ratio_after: self.health_ratio()?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spoor_events::{ConnectionConfig, EventType, run_migrations};

    fn setup() -> (Arc<EventStore>, Reaper) {
        let pool = spoor_events::new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        let store = Arc::new(EventStore::new(pool));
        let reaper = Reaper::new(Arc::clone(&store), "spoor_reaper", vec!["prey8.".into()]);
        (store, reaper)
    }

    fn append_perceive(store: &EventStore, session_id: &str, hours_ago: i64) {
        let mut envelope = Envelope::new(
            EventType::Perceive,
            "crow",
            &format!("session/{session_id}"),
            serde_json::json!({
                "agent_id": "crow",
                "session_id": session_id,
                "nonce": "AAAAAA",
                "probe": "scan",
                "observations": ["x"],
                "memory_refs": [],
            }),
        );
        envelope.time = (Utc::now() - chrono::Duration::hours(hours_ago)).to_rfc3339();
        let _ = store.append(&envelope).unwrap();
    }

    fn append_yield(store: &EventStore, session_id: &str) {
        let envelope = Envelope::new(
            EventType::Yield,
            "crow",
            &format!("session/{session_id}"),
            serde_json::json!({
                "agent_id": "crow",
                "session_id": session_id,
                "token": "BBBBBB",
                "summary": "done",
                "immunization_status": "PASSED",
                "mutation_confidence": 80,
            }),
        );
        let _ = store.append(&envelope).unwrap();
    }

    #[test]
    fn fresh_sessions_are_not_orphans() {
        let (store, reaper) = setup();
        append_perceive(&store, "s1", 1);
        assert!(reaper.scan_orphans(24.0).unwrap().is_empty());
    }

    #[test]
    fn stale_open_session_is_an_orphan() {
        let (store, reaper) = setup();
        append_perceive(&store, "s1", 48);
        let orphans = reaper.scan_orphans(24.0).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].session_id, "s1");
        assert_eq!(orphans[0].agent_id, "crow");
        assert!(orphans[0].age_hours >= 47.0);
    }

    #[test]
    fn yielded_sessions_are_skipped() {
        let (store, reaper) = setup();
        append_perceive(&store, "s1", 48);
        append_yield(&store, "s1");
        assert!(reaper.scan_orphans(24.0).unwrap().is_empty());
    }

    #[test]
    fn reap_writes_synthetic_failure_yields() {
        let (store, reaper) = setup();
        append_perceive(&store, "s1", 48);
        append_perceive(&store, "s2", 48);

        let report = reaper.reap(24.0).unwrap();
        assert_eq!(report.reaped, 2);
        assert_eq!(report.total_orphans, 2);
        assert!(report.ratio_after > report.ratio_before);
        assert!((report.ratio_before - 0.0).abs() < f64::EPSILON);
        assert!((report.ratio_after - 100.0).abs() < f64::EPSILON);

        let yields = store.get_by_type_prefix("prey8.yield", None).unwrap();
        assert_eq!(yields.len(), 2);
        let data = yields[0].data().unwrap();
        assert_eq!(data["immunization_status"], "FAILED");
        assert_eq!(data["mutation_confidence"], 0);
        assert_eq!(data["reason"], ORPHAN_REASON);
        assert_eq!(yields[0].source, "spoor_reaper");
    }

    #[test]
    fn reap_is_idempotent() {
        let (store, reaper) = setup();
        append_perceive(&store, "s1", 48);

        let first = reaper.reap(24.0).unwrap();
        assert_eq!(first.reaped, 1);

        let second = reaper.reap(24.0).unwrap();
        assert_eq!(second.reaped, 0);
        assert_eq!(second.total_orphans, 0);
        assert_eq!(store.count_by_type("prey8.yield").unwrap(), 1);
    }

    #[test]
    fn health_ratio_counts_only_configured_prefixes() {
        let (store, reaper) = setup();
        append_perceive(&store, "s1", 1);
        append_yield(&store, "s1");
        // A watchdog finding must not skew the ratio.
        let finding = Envelope::new(
            EventType::OrphanAccumulation,
            "spoor_watchdog",
            "anomaly/a3",
            serde_json::json!({"code": "A3"}),
        );
        let _ = store.append(&finding).unwrap();

        let ratio = reaper.health_ratio().unwrap();
        assert!((ratio - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_log_ratio_is_zero() {
        let (_, reaper) = setup();
        assert!((reaper.health_ratio().unwrap() - 0.0).abs() < f64::EPSILON);
    }
}
