//! Live session state.
//!
//! A session is the working state of one agent moving through the phase
//! machine. Exactly one live session exists per agent; yield (or a reap)
//! removes it from the live set, while its full history stays in the
//! signal log.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use spoor_core::{AgentId, Phase, SessionId};

/// Live state of one agent's pass through the phase machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Owning agent.
    pub agent_id: AgentId,
    /// Session ID (16 hex chars), minted at perceive.
    pub session_id: SessionId,
    /// Current phase.
    pub phase: Phase,
    /// Nonce minted at perceive, consumed by react.
    pub perceive_nonce: Option<String>,
    /// Token minted at react, echoed by execute and yield.
    pub react_token: Option<String>,
    /// Number of execute steps recorded so far.
    pub execute_steps: u32,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last transition time (RFC 3339).
    pub updated_at: String,
}

impl Session {
    /// Open a fresh session in the `Perceived` phase.
    #[must_use]
    pub fn open(agent_id: &str, session_id: &str, nonce: &str) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            phase: Phase::Perceived,
            perceive_nonce: Some(nonce.to_string()),
            react_token: None,
            execute_steps: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Move to a new phase, refreshing the update time.
    pub fn advance(&mut self, phase: Phase) {
        self.phase = phase;
        self.updated_at = Utc::now().to_rfc3339();
    }
}

/// Where live sessions are kept.
///
/// The engine owns no session state of its own; it reads and writes through
/// this trait, so a process can swap in a shared or persistent store without
/// touching the phase logic.
pub trait SessionStore: Send + Sync {
    /// The live session for an agent, if one exists.
    fn get(&self, agent_id: &str) -> Option<Session>;
    /// Insert or replace the live session for its agent.
    fn upsert(&self, session: Session);
    /// Remove and return an agent's live session.
    fn remove(&self, agent_id: &str) -> Option<Session>;
    /// Snapshot of all live sessions.
    fn live(&self) -> Vec<Session>;
}

/// Process-local session store backed by a read-write lock.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, agent_id: &str) -> Option<Session> {
        self.sessions.read().get(agent_id).cloned()
    }

    fn upsert(&self, session: Session) {
        let _ = self
            .sessions
            .write()
            .insert(session.agent_id.to_string(), session);
    }

    fn remove(&self, agent_id: &str) -> Option<Session> {
        self.sessions.write().remove(agent_id)
    }

    fn live(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
