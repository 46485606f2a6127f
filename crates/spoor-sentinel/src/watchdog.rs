//! Anomaly scanner over the signal log.
//!
//! Seven detectors (A1–A7) read a time window of the log and classify
//! suspicious patterns: gate-block storms, tamper clusters, orphan
//! accumulation, session pollution, nonce replay, rapid-fire perceives and
//! agent impersonation. The scanner is read-only except for its own
//! findings, which it appends back into the log as `watchdog.*` envelopes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{instrument, trace, warn};

use spoor_core::AgentRegistry;
use spoor_events::{Envelope, EventStore, EventType, FindingData, Severity};

use crate::errors::Result;

/// Detector thresholds.
#[derive(Clone, Debug)]
pub struct Thresholds {
    /// A1: gate blocks per agent before a storm is flagged.
    pub gate_block_storm: usize,
    /// A2: tamper alerts in the window before a cluster is flagged.
    pub tamper_cluster: usize,
    /// A3: perceive-without-yield ratio above which orphans accumulate.
    pub orphan_ratio: f64,
    /// A6: perceives per agent before rapid fire is flagged.
    pub rapid_perceive: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            gate_block_storm: 5,
            tamper_cluster: 3,
            orphan_ratio: 0.3,
            rapid_perceive: 5,
        }
    }
}

/// One record of the scan window, reduced to the fields detectors read.
#[derive(Clone, Debug)]
struct ScanRecord {
    event_type: String,
    agent_id: Option<String>,
    session_id: Option<String>,
    nonce: Option<String>,
}

/// The watchdog scanner.
pub struct Watchdog {
    store: std::sync::Arc<EventStore>,
    registry: AgentRegistry,
    thresholds: Thresholds,
    source: String,
}

impl Watchdog {
    /// Create a new watchdog.
    pub fn new(
        store: std::sync::Arc<EventStore>,
        registry: AgentRegistry,
        thresholds: Thresholds,
        source: &str,
    ) -> Self {
        Self {
            store,
            registry,
            thresholds,
            source: source.to_string(),
        }
    }

    /// Scan the last `window_secs` of the log and return findings.
    ///
    /// Read-only: call [`Watchdog::report`] to persist the findings.
    #[instrument(skip(self))]
    pub fn scan(&self, window_secs: u64) -> Result<Vec<FindingData>> {
        let now = Utc::now();
        let from = now - Duration::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX));
        let rows = self
            .store
            .get_in_window(&from.to_rfc3339(), &(now + Duration::hours(1)).to_rfc3339())?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.data() {
                Ok(data) => records.push(Self::reduce(&row.event_type, &data)),
                // One bad record must not abort the scan.
                Err(err) => trace!(seq = row.seq, %err, "skipping unparseable signal"),
            }
        }

        let detected_at = now.to_rfc3339();
        let mut findings = Vec::new();
        findings.extend(self.a1_gate_block_storm(&records, &detected_at));
        findings.extend(self.a2_tamper_cluster(&records, &detected_at));
        findings.extend(self.a3_orphan_accumulation(&records, &detected_at));
        findings.extend(Self::a4_session_pollution(&records, &detected_at));
        findings.extend(Self::a5_nonce_replay(&records, &detected_at));
        findings.extend(self.a6_rapid_fire_perceive(&records, &detected_at));
        findings.extend(self.a7_agent_impersonation(&records, &detected_at));
        Ok(findings)
    }

    /// Scan and append each finding as a `watchdog.*` envelope.
    #[instrument(skip(self))]
    pub fn report(&self, window_secs: u64) -> Result<Vec<FindingData>> {
        let findings = self.scan(window_secs)?;
        for finding in &findings {
            warn!(
                code = finding.code,
                severity = ?finding.severity,
                description = finding.description,
                "anomaly detected"
            );
            let envelope = Envelope::new(
                Self::event_type_for(&finding.code),
                &self.source,
                &format!("anomaly/{}", finding.code.to_lowercase()),
                serde_json::to_value(finding)?,
            );
            let _ = self.store.append(&envelope)?;
        }
        Ok(findings)
    }

    fn event_type_for(code: &str) -> EventType {
        match code.get(..2) {
            Some("A1") => EventType::GateBlockStorm,
            Some("A2") => EventType::TamperCluster,
            Some("A3") => EventType::OrphanAccumulation,
            Some("A4") => EventType::SessionPollution,
            Some("A5") => EventType::NonceReplay,
            Some("A6") => EventType::RapidFirePerceive,
            _ => EventType::AgentImpersonation,
        }
    }

    fn reduce(event_type: &str, data: &Value) -> ScanRecord {
        let field = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        ScanRecord {
            event_type: event_type.to_string(),
            agent_id: field("agent_id"),
            session_id: field("session_id"),
            nonce: field("perceive_nonce").or_else(|| field("nonce")),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Detectors
    // ─────────────────────────────────────────────────────────────────────

    /// A1: one agent hitting `gate_blocked` repeatedly.
    fn a1_gate_block_storm(&self, records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let mut per_agent: BTreeMap<&str, usize> = BTreeMap::new();
        for r in records {
            if r.event_type == "prey8.gate_blocked" {
                let agent = r.agent_id.as_deref().unwrap_or("unknown");
                *per_agent.entry(agent).or_default() += 1;
            }
        }

        per_agent
            .into_iter()
            .filter(|(_, count)| *count >= self.thresholds.gate_block_storm)
            .map(|(agent, count)| FindingData {
                code: "A1_GATE_BLOCK_STORM".into(),
                severity: if count < self.thresholds.gate_block_storm * 2 {
                    Severity::Warning
                } else {
                    Severity::Critical
                },
                description: format!(
                    "agent '{agent}' was gate-blocked {count} times in the scan window \
                     (threshold {})",
                    self.thresholds.gate_block_storm
                ),
                evidence: serde_json::json!({
                    "block_count": count,
                    "threshold": self.thresholds.gate_block_storm,
                }),
                agent_id: Some(agent.to_string()),
                detected_at: detected_at.to_string(),
            })
            .collect()
    }

    /// A2: tamper alerts clustering in the window.
    fn a2_tamper_cluster(&self, records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let tampers: Vec<&ScanRecord> = records
            .iter()
            .filter(|r| r.event_type == "prey8.tamper_alert")
            .collect();
        if tampers.len() < self.thresholds.tamper_cluster {
            return Vec::new();
        }

        let agents: BTreeSet<&str> = tampers
            .iter()
            .filter_map(|r| r.agent_id.as_deref())
            .collect();
        vec![FindingData {
            code: "A2_TAMPER_CLUSTER".into(),
            severity: Severity::Critical,
            description: format!(
                "{} tamper alerts in the scan window (threshold {}); session injection \
                 or credential manipulation likely",
                tampers.len(),
                self.thresholds.tamper_cluster
            ),
            evidence: serde_json::json!({
                "tamper_count": tampers.len(),
                "threshold": self.thresholds.tamper_cluster,
                "agents": agents,
            }),
            agent_id: None,
            detected_at: detected_at.to_string(),
        }]
    }

    /// A3: sessions opened but never closed.
    fn a3_orphan_accumulation(&self, records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let perceives = records
            .iter()
            .filter(|r| r.event_type == "prey8.perceive")
            .count();
        let yields = records
            .iter()
            .filter(|r| r.event_type == "prey8.yield")
            .count();
        if perceives == 0 {
            return Vec::new();
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = 1.0 - (yields as f64 / perceives as f64);
        if ratio <= self.thresholds.orphan_ratio || perceives.saturating_sub(yields) <= 2 {
            return Vec::new();
        }

        vec![FindingData {
            code: "A3_ORPHAN_ACCUMULATION".into(),
            severity: Severity::Warning,
            description: format!(
                "perceive-without-yield ratio is {ratio:.2} ({perceives} perceives, \
                 {yields} yields; threshold {}); sessions are opened but not closed",
                self.thresholds.orphan_ratio
            ),
            evidence: serde_json::json!({
                "perceive_count": perceives,
                "yield_count": yields,
                "orphan_ratio": ratio,
                "threshold": self.thresholds.orphan_ratio,
            }),
            agent_id: None,
            detected_at: detected_at.to_string(),
        }]
    }

    /// A4: more than one agent writing under the same session ID.
    fn a4_session_pollution(records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let mut session_agents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for r in records {
            if let (Some(sid), Some(agent)) = (r.session_id.as_deref(), r.agent_id.as_deref()) {
                let _ = session_agents.entry(sid).or_default().insert(agent);
            }
        }

        session_agents
            .into_iter()
            .filter(|(_, agents)| agents.len() > 1)
            .map(|(sid, agents)| FindingData {
                code: "A4_SESSION_POLLUTION".into(),
                severity: Severity::Critical,
                description: format!(
                    "session '{sid}' carries records from {} distinct agents; \
                     cross-agent isolation failure",
                    agents.len()
                ),
                evidence: serde_json::json!({
                    "session_id": sid,
                    "agent_count": agents.len(),
                    "agents": agents,
                }),
                agent_id: None,
                detected_at: detected_at.to_string(),
            })
            .collect()
    }

    /// A5: one nonce appearing across distinct sessions.
    fn a5_nonce_replay(records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let mut nonce_sessions: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for r in records {
            if let (Some(nonce), Some(sid)) = (r.nonce.as_deref(), r.session_id.as_deref()) {
                if nonce.len() >= 6 {
                    let _ = nonce_sessions.entry(nonce).or_default().insert(sid);
                }
            }
        }

        nonce_sessions
            .into_iter()
            .filter(|(_, sessions)| sessions.len() > 1)
            .map(|(nonce, sessions)| FindingData {
                code: "A5_NONCE_REPLAY".into(),
                severity: Severity::Critical,
                description: format!(
                    "nonce '{nonce}' appears in {} distinct sessions; nonces are \
                     single-session credentials",
                    sessions.len()
                ),
                evidence: serde_json::json!({
                    "nonce": nonce,
                    "session_count": sessions.len(),
                    "sessions": sessions,
                }),
                agent_id: None,
                detected_at: detected_at.to_string(),
            })
            .collect()
    }

    /// A6: one agent opening sessions faster than plausible.
    fn a6_rapid_fire_perceive(&self, records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let mut per_agent: BTreeMap<&str, usize> = BTreeMap::new();
        for r in records {
            if r.event_type == "prey8.perceive" {
                let agent = r.agent_id.as_deref().unwrap_or("unknown");
                *per_agent.entry(agent).or_default() += 1;
            }
        }

        per_agent
            .into_iter()
            .filter(|(_, count)| *count >= self.thresholds.rapid_perceive)
            .map(|(agent, count)| FindingData {
                code: "A6_RAPID_FIRE_PERCEIVE".into(),
                severity: Severity::Warning,
                description: format!(
                    "agent '{agent}' opened {count} sessions in the scan window \
                     (threshold {}); possible runaway loop",
                    self.thresholds.rapid_perceive
                ),
                evidence: serde_json::json!({
                    "perceive_count": count,
                    "threshold": self.thresholds.rapid_perceive,
                }),
                agent_id: Some(agent.to_string()),
                detected_at: detected_at.to_string(),
            })
            .collect()
    }

    /// A7: records authored by agents the registry has never heard of.
    fn a7_agent_impersonation(&self, records: &[ScanRecord], detected_at: &str) -> Vec<FindingData> {
        let mut unknown: BTreeMap<&str, usize> = BTreeMap::new();
        for r in records {
            if r.event_type.starts_with("prey8.") {
                if let Some(agent) = r.agent_id.as_deref() {
                    if agent != "unknown" && !self.registry.is_registered(agent) {
                        *unknown.entry(agent).or_default() += 1;
                    }
                }
            }
        }

        unknown
            .into_iter()
            .map(|(agent, count)| FindingData {
                code: "A7_AGENT_IMPERSONATION".into(),
                severity: Severity::Critical,
                description: format!(
                    "agent '{agent}' appears in {count} records but is not in the \
                     registry; impersonation or an unauthorized agent"
                ),
                evidence: serde_json::json!({
                    "agent_id": agent,
                    "record_count": count,
                }),
                agent_id: Some(agent.to_string()),
                detected_at: detected_at.to_string(),
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
