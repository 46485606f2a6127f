//! Typed payloads for the `data` field of signal envelopes.
//!
//! Each protocol event type has a concrete payload struct, collected into
//! the [`EventData`] union so the engine can never pair a payload with the
//! wrong event type. Payloads carry their own field validation — the rules
//! a record must satisfy before the engine will persist it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use spoor_core::Gate;

use crate::errors::Result;
use crate::types::event_type::EventType;

/// A given/when/then contract attached to execute and yield records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbeContract {
    /// Precondition.
    pub given: String,
    /// Action taken.
    pub when: String,
    /// Observable outcome.
    pub then: String,
}

impl SbeContract {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.given.trim().is_empty() || self.when.trim().is_empty() || self.then.trim().is_empty()
        {
            return Err("sbe contract requires non-empty given/when/then".into());
        }
        Ok(())
    }
}

/// Outcome classification on a yield record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImmunizationStatus {
    /// Work verified against its contract.
    Passed,
    /// Work not verified (includes reaper-closed sessions).
    Failed,
}

/// Payload of a `prey8.perceive` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerceiveData {
    /// Authoring agent.
    pub agent_id: String,
    /// Session opened by this perceive.
    pub session_id: String,
    /// Nonce minted for the react phase.
    pub nonce: String,
    /// What the agent set out to investigate.
    pub probe: String,
    /// Observations gathered from the environment.
    pub observations: Vec<String>,
    /// References into prior signals or journal entries.
    pub memory_refs: Vec<String>,
}

impl PerceiveData {
    /// Validate required fields.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.probe.trim().is_empty() {
            return Err("perceive requires a probe".into());
        }
        if self.observations.is_empty() {
            return Err("perceive requires at least one observation".into());
        }
        Ok(())
    }
}

/// Payload of a `prey8.react` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReactData {
    /// Authoring agent.
    pub agent_id: String,
    /// Session being advanced.
    pub session_id: String,
    /// Echo of the nonce minted at perceive.
    pub perceive_nonce: String,
    /// Token minted for the execute phase.
    pub token: String,
    /// Analysis of the observations.
    pub analysis: String,
    /// Where the agent intends to steer the system.
    pub navigation_intent: String,
    /// Leverage level of the intervention (1 = deepest, 13 = shallowest).
    pub meadows_level: u8,
    /// Ordered plan for the execute phase.
    pub sequential_plan: Vec<String>,
}

impl ReactData {
    /// Validate required fields.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.analysis.trim().is_empty() {
            return Err("react requires an analysis".into());
        }
        if self.navigation_intent.trim().is_empty() {
            return Err("react requires a navigation intent".into());
        }
        if !(1..=13).contains(&self.meadows_level) {
            return Err("meadows_level must be between 1 and 13".into());
        }
        if self.sequential_plan.is_empty() {
            return Err("react requires a non-empty sequential plan".into());
        }
        Ok(())
    }
}

/// Payload of a `prey8.execute` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteData {
    /// Authoring agent.
    pub agent_id: String,
    /// Session being advanced.
    pub session_id: String,
    /// Echo of the token minted at react (or the previous execute).
    pub token: String,
    /// 1-based step number within the session.
    pub step: u32,
    /// What was done in this step.
    pub action_summary: String,
    /// Contract for this step.
    pub sbe: SbeContract,
    /// Concrete artifacts produced (paths, hashes, row IDs).
    pub artifacts: Vec<String>,
    /// Must be `true`: the agent attests it will fail closed on error.
    pub fail_closed_gate: bool,
}

impl ExecuteData {
    /// Validate required fields.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.action_summary.trim().is_empty() {
            return Err("execute requires an action summary".into());
        }
        self.sbe.validate()?;
        if self.artifacts.is_empty() {
            return Err("execute requires at least one artifact".into());
        }
        if !self.fail_closed_gate {
            return Err("fail_closed_gate must be true".into());
        }
        Ok(())
    }
}

/// Payload of a `prey8.yield` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YieldData {
    /// Authoring agent (or the reaper acting on its behalf).
    pub agent_id: String,
    /// Session being closed.
    pub session_id: String,
    /// Echo of the current token.
    pub token: String,
    /// Delivery summary.
    pub summary: String,
    /// Outcome classification.
    pub immunization_status: ImmunizationStatus,
    /// Confidence the work mutated the system as intended (0–100).
    pub mutation_confidence: u8,
    /// Completion contract, when the agent closed the session itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<SbeContract>,
    /// Machine-readable close cause (e.g. `"orphaned_timeout"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl YieldData {
    /// Validate required fields.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("yield requires a summary".into());
        }
        if self.mutation_confidence > 100 {
            return Err("mutation_confidence must be between 0 and 100".into());
        }
        Ok(())
    }
}

/// Payload of a `prey8.gate_blocked` audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateBlockedData {
    /// Agent that was denied (may be blank for missing identity).
    pub agent_id: String,
    /// Gate the agent attempted.
    pub gate: Gate,
    /// Stable block reason from the authorization check.
    pub reason: String,
}

/// Payload of a `prey8.tamper_alert` audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperAlertData {
    /// Agent whose session was poisoned.
    pub agent_id: String,
    /// Session involved, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Gate at which the violation surfaced.
    pub gate: Gate,
    /// What mismatched (phase order, nonce, or token).
    pub detail: String,
}

/// Finding severity, ordered by urgency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational.
    Info,
    /// Worth attention.
    Warning,
    /// Structural attack or invariant breach.
    Critical,
}

/// Payload of a `watchdog.*` finding record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindingData {
    /// Anomaly code (`A1`..`A7`).
    pub code: String,
    /// Finding severity.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// Supporting evidence (counts, IDs, samples).
    pub evidence: Value,
    /// Implicated agent, when one can be named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// When the scan detected this (RFC 3339).
    pub detected_at: String,
}

/// Protocol payload union. Each variant carries exactly the payload its
/// event type expects, so a record can never be persisted under the wrong
/// type string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    /// `prey8.perceive`
    Perceive(PerceiveData),
    /// `prey8.react`
    React(ReactData),
    /// `prey8.execute`
    Execute(ExecuteData),
    /// `prey8.yield`
    Yield(YieldData),
    /// `prey8.gate_blocked`
    GateBlocked(GateBlockedData),
    /// `prey8.tamper_alert`
    TamperAlert(TamperAlertData),
}

impl EventData {
    /// The event type this payload belongs under.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Perceive(_) => EventType::Perceive,
            Self::React(_) => EventType::React,
            Self::Execute(_) => EventType::Execute,
            Self::Yield(_) => EventType::Yield,
            Self::GateBlocked(_) => EventType::GateBlocked,
            Self::TamperAlert(_) => EventType::TamperAlert,
        }
    }

    /// Validate required fields for this payload.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Perceive(d) => d.validate(),
            Self::React(d) => d.validate(),
            Self::Execute(d) => d.validate(),
            Self::Yield(d) => d.validate(),
            // Audit records are produced by the engine itself.
            Self::GateBlocked(_) | Self::TamperAlert(_) => Ok(()),
        }
    }

    /// Serialize to a JSON value for the envelope `data` field.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn perceive() -> PerceiveData {
        PerceiveData {
            agent_id: "crow".into(),
            session_id: "a1b2c3d4e5f60718".into(),
            nonce: "0AF3C9".into(),
            probe: "scan signal backlog".into(),
            observations: vec!["backlog at 14 signals".into()],
            memory_refs: vec!["journal:crow:42".into()],
        }
    }

    fn react() -> ReactData {
        ReactData {
            agent_id: "crow".into(),
            session_id: "a1b2c3d4e5f60718".into(),
            perceive_nonce: "0AF3C9".into(),
            token: "7B21E0".into(),
            analysis: "backlog growth is linear".into(),
            navigation_intent: "drain the backlog".into(),
            meadows_level: 6,
            sequential_plan: vec!["drain".into(), "verify".into()],
        }
    }

    fn execute() -> ExecuteData {
        ExecuteData {
            agent_id: "crow".into(),
            session_id: "a1b2c3d4e5f60718".into(),
            token: "7B21E0".into(),
            step: 1,
            action_summary: "drained 14 signals".into(),
            sbe: SbeContract {
                given: "a backlog of 14".into(),
                when: "the drain runs".into(),
                then: "the backlog is empty".into(),
            },
            artifacts: vec!["signals.db".into()],
            fail_closed_gate: true,
        }
    }

    fn yield_data() -> YieldData {
        YieldData {
            agent_id: "crow".into(),
            session_id: "a1b2c3d4e5f60718".into(),
            token: "7B21E0".into(),
            summary: "backlog drained and verified".into(),
            immunization_status: ImmunizationStatus::Passed,
            mutation_confidence: 90,
            completion: None,
            reason: None,
        }
    }

    #[test]
    fn valid_payloads_pass() {
        assert!(perceive().validate().is_ok());
        assert!(react().validate().is_ok());
        assert!(execute().validate().is_ok());
        assert!(yield_data().validate().is_ok());
    }

    #[test]
    fn perceive_requires_probe_and_observations() {
        let mut d = perceive();
        d.probe = "  ".into();
        assert!(d.validate().is_err());

        let mut d = perceive();
        d.observations.clear();
        assert!(d.validate().is_err());
    }

    #[test]
    fn react_meadows_level_bounds() {
        let mut d = react();
        d.meadows_level = 0;
        assert!(d.validate().is_err());
        d.meadows_level = 13;
        assert!(d.validate().is_ok());
        d.meadows_level = 14;
        assert!(d.validate().is_err());
    }

    #[test]
    fn react_requires_plan() {
        let mut d = react();
        d.sequential_plan.clear();
        assert!(d.validate().is_err());
    }

    #[test]
    fn execute_fail_closed_gate_must_be_true() {
        let mut d = execute();
        d.fail_closed_gate = false;
        let err = d.validate().unwrap_err();
        assert!(err.contains("fail_closed_gate"));
    }

    #[test]
    fn execute_requires_artifacts_and_sbe() {
        let mut d = execute();
        d.artifacts.clear();
        assert!(d.validate().is_err());

        let mut d = execute();
        d.sbe.then = String::new();
        assert!(d.validate().is_err());
    }

    #[test]
    fn yield_confidence_bounds() {
        let mut d = yield_data();
        d.mutation_confidence = 100;
        assert!(d.validate().is_ok());
        d.mutation_confidence = 101;
        assert!(d.validate().is_err());
    }

    #[test]
    fn event_data_maps_to_type() {
        assert_eq!(
            EventData::Perceive(perceive()).event_type(),
            EventType::Perceive
        );
        assert_eq!(
            EventData::Yield(yield_data()).event_type(),
            EventType::Yield
        );
    }

    #[test]
    fn immunization_status_wire_strings() {
        assert_eq!(
            serde_json::to_string(&ImmunizationStatus::Passed).unwrap(),
            "\"PASSED\""
        );
        assert_eq!(
            serde_json::to_string(&ImmunizationStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn yield_data_serde_roundtrip() {
        let d = YieldData {
            completion: Some(SbeContract {
                given: "g".into(),
                when: "w".into(),
                then: "t".into(),
            }),
            reason: Some("orphaned_timeout".into()),
            ..yield_data()
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: YieldData = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn yield_data_omits_empty_optionals() {
        let json = serde_json::to_string(&yield_data()).unwrap();
        assert!(!json.contains("completion"));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn finding_data_serde_roundtrip() {
        let finding = FindingData {
            code: "A4".into(),
            severity: Severity::Critical,
            description: "2 agents under one session".into(),
            evidence: serde_json::json!({"session_id": "abc", "agents": ["crow", "spider"]}),
            agent_id: None,
            detected_at: "2026-08-30T12:00:00Z".into(),
        };
        let json = serde_json::to_string(&finding).unwrap();
        let back: FindingData = serde_json::from_str(&json).unwrap();
        assert_eq!(finding, back);
        assert!(json.contains("\"CRITICAL\""));
    }
}
