//! Signal event type vocabulary.
//!
//! Each variant serializes to a dot-separated string. The `prey8.*`
//! namespace carries protocol traffic (phase records plus the two audit
//! types), `watchdog.*` carries anomaly findings. Downstream consumers
//! filter by string prefix, so the wire values are load-bearing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::StoreError;

/// All signal event types persisted to the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // ── Protocol phases ──────────────────────────────────────────────
    /// Session opened; observations recorded.
    #[serde(rename = "prey8.perceive")]
    Perceive,
    /// Analysis and plan committed.
    #[serde(rename = "prey8.react")]
    React,
    /// Execution step recorded.
    #[serde(rename = "prey8.execute")]
    Execute,
    /// Session closed with a delivery summary.
    #[serde(rename = "prey8.yield")]
    Yield,

    // ── Protocol audit ───────────────────────────────────────────────
    /// An authorization gate denied an agent.
    #[serde(rename = "prey8.gate_blocked")]
    GateBlocked,
    /// A nonce/token or phase-order violation was detected.
    #[serde(rename = "prey8.tamper_alert")]
    TamperAlert,

    // ── Watchdog findings ────────────────────────────────────────────
    /// Repeated gate blocks from one agent in a short window.
    #[serde(rename = "watchdog.a1_gate_block_storm")]
    GateBlockStorm,
    /// A cluster of tamper alerts in a short window.
    #[serde(rename = "watchdog.a2_tamper_cluster")]
    TamperCluster,
    /// Perceive-without-yield ratio above threshold.
    #[serde(rename = "watchdog.a3_orphan_accumulation")]
    OrphanAccumulation,
    /// More than one agent writing under a single session ID.
    #[serde(rename = "watchdog.a4_session_pollution")]
    SessionPollution,
    /// The same nonce observed across distinct sessions.
    #[serde(rename = "watchdog.a5_nonce_replay")]
    NonceReplay,
    /// Perceive storm from one agent without intervening yields.
    #[serde(rename = "watchdog.a6_rapid_fire_perceive")]
    RapidFirePerceive,
    /// Events authored by an agent with no registry entry.
    #[serde(rename = "watchdog.a7_agent_impersonation")]
    AgentImpersonation,
}

impl EventType {
    /// Wire string for this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perceive => "prey8.perceive",
            Self::React => "prey8.react",
            Self::Execute => "prey8.execute",
            Self::Yield => "prey8.yield",
            Self::GateBlocked => "prey8.gate_blocked",
            Self::TamperAlert => "prey8.tamper_alert",
            Self::GateBlockStorm => "watchdog.a1_gate_block_storm",
            Self::TamperCluster => "watchdog.a2_tamper_cluster",
            Self::OrphanAccumulation => "watchdog.a3_orphan_accumulation",
            Self::SessionPollution => "watchdog.a4_session_pollution",
            Self::NonceReplay => "watchdog.a5_nonce_replay",
            Self::RapidFirePerceive => "watchdog.a6_rapid_fire_perceive",
            Self::AgentImpersonation => "watchdog.a7_agent_impersonation",
        }
    }

    /// Whether this is a protocol (`prey8.*`) type.
    #[must_use]
    pub fn is_protocol(self) -> bool {
        self.as_str().starts_with("prey8.")
    }

    /// Whether this is a watchdog finding type.
    #[must_use]
    pub fn is_finding(self) -> bool {
        self.as_str().starts_with("watchdog.")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_EVENT_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::InvalidOperation(format!("unknown event type: {s}")))
    }
}

/// All event type variants, for exhaustive testing.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::Perceive,
    EventType::React,
    EventType::Execute,
    EventType::Yield,
    EventType::GateBlocked,
    EventType::TamperAlert,
    EventType::GateBlockStorm,
    EventType::TamperCluster,
    EventType::OrphanAccumulation,
    EventType::SessionPollution,
    EventType::NonceReplay,
    EventType::RapidFirePerceive,
    EventType::AgentImpersonation,
];

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
