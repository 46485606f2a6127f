//! Agent registry and deny-by-default authorization.
//!
//! The registry is administered data: loaded from settings at startup and
//! read-only at runtime. An agent absent from the registry has an implicit
//! empty gate set — there is no way to be authorized without an explicit
//! entry. Every authorization check produces an explicit [`Decision`];
//! callers must pattern-match and are expected to audit every block.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::gate::Gate;

/// A registered agent identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable agent identifier (registry key).
    pub agent_id: String,
    /// Human-readable name for logs and findings.
    pub display_name: String,
    /// Gates this agent may invoke. Empty means fully locked out.
    #[serde(default)]
    pub allowed_gates: Vec<Gate>,
    /// Optional role tag (informational only, never consulted for access).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Outcome of an authorization check.
///
/// INVARIANT: deny-by-default — [`Decision::Allowed`] requires a registry
/// entry whose `allowed_gates` contains the requested gate. Every other
/// path is [`Decision::Blocked`] with a stable reason string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The agent may invoke the gate.
    Allowed,
    /// The agent may not invoke the gate.
    Blocked {
        /// Stable reason string, suitable for audit payloads.
        reason: String,
    },
}

impl Decision {
    /// Whether this decision permits the operation.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn blocked(reason: &str) -> Self {
        Self::Blocked {
            reason: reason.to_string(),
        }
    }
}

/// Read-only agent registry.
#[derive(Clone, Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentIdentity>,
}

impl AgentRegistry {
    /// Build a registry from identity records. Later duplicates win.
    #[must_use]
    pub fn new(identities: Vec<AgentIdentity>) -> Self {
        let agents = identities
            .into_iter()
            .map(|identity| (identity.agent_id.clone(), identity))
            .collect();
        Self { agents }
    }

    /// Look up a registered identity.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<&AgentIdentity> {
        self.agents.get(agent_id)
    }

    /// Whether the agent has a registry entry at all.
    #[must_use]
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Check whether `agent_id` may invoke `gate`.
    ///
    /// Blank identity, unknown identity, and unauthorized gate each map to
    /// a distinct stable reason so audit events can be aggregated by cause.
    #[must_use]
    pub fn authorize(&self, agent_id: &str, gate: Gate) -> Decision {
        if agent_id.trim().is_empty() {
            return Decision::blocked("missing agent identity");
        }
        let Some(identity) = self.agents.get(agent_id) else {
            return Decision::blocked("unknown agent");
        };
        if identity.allowed_gates.contains(&gate) {
            Decision::Allowed
        } else {
            Decision::blocked("gate not authorized for agent")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
