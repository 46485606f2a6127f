//! The PREY8 phase engine.
//!
//! Every phase call follows the same path: authorize against the registry,
//! check phase order, check the nonce/token credential, validate the payload,
//! append the envelope, and only then mutate the live session. Denials are
//! ordinary outcomes, not errors: every denial returns
//! [`PhaseReply::Blocked`] and leaves a `prey8.gate_blocked` or
//! `prey8.tamper_alert` record in the log.

use std::fmt::Write as _;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, instrument, warn};

use spoor_core::{AgentRegistry, Decision, Gate, Phase};
use spoor_events::{
    Envelope, EventData, EventStore, ExecuteData, GateBlockedData, ImmunizationStatus,
    PerceiveData, ReactData, SbeContract, TamperAlertData, YieldData,
};

use crate::errors::Result;
use crate::session::{Session, SessionStore};

/// Length of a phase credential (nonce or token), in hex chars.
const CREDENTIAL_LEN: usize = 6;

/// Length of a session ID, in hex chars.
const SESSION_ID_LEN: usize = 16;

/// Receipt for an accepted phase call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseReceipt {
    /// Session the call advanced.
    pub session_id: String,
    /// Phase the session is now in.
    pub phase: Phase,
    /// Credential for the next phase: the nonce after perceive, the token
    /// after react, `None` after yield.
    pub credential: Option<String>,
    /// Execute steps recorded so far.
    pub step: u32,
    /// Content hash of the appended record.
    pub content_hash: String,
    /// Log sequence of the appended record.
    pub seq: i64,
}

/// Receipt for a denied phase call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockReceipt {
    /// Why the call was denied.
    pub reason: String,
    /// Whether the denial indicates tampering (bad credential or phase
    /// order) rather than plain lack of authorization.
    pub tampered: bool,
}

/// Outcome of a phase call. Denial is a value, never an `Err`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhaseReply {
    /// The call was accepted and the session advanced.
    Advanced(PhaseReceipt),
    /// The call was denied; session state is unchanged.
    Blocked(BlockReceipt),
}

impl PhaseReply {
    /// Whether the call was accepted.
    #[must_use]
    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced(_))
    }
}

/// Perceive-phase input.
#[derive(Clone, Debug)]
pub struct PerceiveRequest {
    /// What the agent set out to investigate.
    pub probe: String,
    /// Observations gathered from the environment.
    pub observations: Vec<String>,
    /// References into prior signals or journal entries.
    pub memory_refs: Vec<String>,
}

/// React-phase input.
#[derive(Clone, Debug)]
pub struct ReactRequest {
    /// Echo of the nonce minted at perceive.
    pub perceive_nonce: String,
    /// Analysis of the observations.
    pub analysis: String,
    /// Where the agent intends to steer the system.
    pub navigation_intent: String,
    /// Leverage level of the intervention (1–13).
    pub meadows_level: u8,
    /// Ordered plan for the execute phase.
    pub sequential_plan: Vec<String>,
}

/// Execute-phase input.
#[derive(Clone, Debug)]
pub struct ExecuteRequest {
    /// Echo of the token minted at react.
    pub token: String,
    /// What was done in this step.
    pub action_summary: String,
    /// Contract for this step.
    pub sbe: SbeContract,
    /// Concrete artifacts produced.
    pub artifacts: Vec<String>,
    /// Attestation that the agent fails closed on error.
    pub fail_closed_gate: bool,
}

/// Yield-phase input.
#[derive(Clone, Debug)]
pub struct YieldRequest {
    /// Echo of the token minted at react.
    pub token: String,
    /// Delivery summary.
    pub summary: String,
    /// Outcome classification.
    pub immunization_status: ImmunizationStatus,
    /// Confidence the work mutated the system as intended (0–100).
    pub mutation_confidence: u8,
    /// Completion contract.
    pub completion: Option<SbeContract>,
}

/// Mint a phase credential: 6 uppercase hex chars.
fn mint_credential() -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(CREDENTIAL_LEN);
    for _ in 0..CREDENTIAL_LEN {
        let _ = write!(out, "{:X}", rng.random_range(0..16));
    }
    out
}

/// Mint a session ID: 16 lowercase hex chars.
fn mint_session_id() -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(SESSION_ID_LEN);
    for _ in 0..SESSION_ID_LEN {
        let _ = write!(out, "{:x}", rng.random_range(0..16));
    }
    out
}

/// The phase engine.
///
/// Stateless beyond its collaborators: the signal log holds history, the
/// session store holds live state, the registry decides authorization.
pub struct ProtocolEngine {
    store: Arc<EventStore>,
    registry: AgentRegistry,
    sessions: Arc<dyn SessionStore>,
    source: String,
}

impl ProtocolEngine {
    /// Create a new engine.
    pub fn new(
        store: Arc<EventStore>,
        registry: AgentRegistry,
        sessions: Arc<dyn SessionStore>,
        source: &str,
    ) -> Self {
        Self {
            store,
            registry,
            sessions,
            source: source.to_string(),
        }
    }

    /// The live session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shared checks
    // ─────────────────────────────────────────────────────────────────────

    /// Authorize the call; on denial, audit it and build the block reply.
    fn check_gate(&self, agent_id: &str, gate: Gate) -> Result<Option<PhaseReply>> {
        match self.registry.authorize(agent_id, gate) {
            Decision::Allowed => Ok(None),
            Decision::Blocked { reason } => {
                warn!(agent_id, gate = gate.as_str(), reason, "gate blocked");
                let data = GateBlockedData {
                    agent_id: agent_id.to_string(),
                    gate,
                    reason: reason.clone(),
                };
                let envelope = Envelope::new(
                    EventData::GateBlocked(data.clone()).event_type(),
                    &self.source,
                    &format!("agent/{agent_id}"),
                    EventData::GateBlocked(data).to_value()?,
                );
                let _ = self.store.append(&envelope)?;
                Ok(Some(PhaseReply::Blocked(BlockReceipt {
                    reason,
                    tampered: false,
                })))
            }
        }
    }

    /// Record a tamper alert and build the block reply.
    fn tamper(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        gate: Gate,
        detail: &str,
    ) -> Result<PhaseReply> {
        warn!(agent_id, gate = gate.as_str(), detail, "tamper alert");
        let data = TamperAlertData {
            agent_id: agent_id.to_string(),
            session_id: session_id.map(str::to_string),
            gate,
            detail: detail.to_string(),
        };
        let subject = match session_id {
            Some(id) => format!("session/{id}"),
            None => format!("agent/{agent_id}"),
        };
        let envelope = Envelope::new(
            EventData::TamperAlert(data.clone()).event_type(),
            &self.source,
            &subject,
            EventData::TamperAlert(data).to_value()?,
        );
        let _ = self.store.append(&envelope)?;
        Ok(PhaseReply::Blocked(BlockReceipt {
            reason: detail.to_string(),
            tampered: true,
        }))
    }

    /// Fetch the live session and check it accepts the gate.
    ///
    /// A missing session or a wrong phase is a protocol-order violation and
    /// raises a tamper alert.
    fn check_session(&self, agent_id: &str, gate: Gate) -> Result<std::result::Result<Session, PhaseReply>> {
        let Some(session) = self.sessions.get(agent_id) else {
            let reply = self.tamper(
                agent_id,
                None,
                gate,
                &format!("{gate} without a live session"),
            )?;
            return Ok(Err(reply));
        };
        if !session.phase.accepts(gate) {
            let reply = self.tamper(
                agent_id,
                Some(session.session_id.as_str()),
                gate,
                &format!("{gate} out of order in phase {}", session.phase),
            )?;
            return Ok(Err(reply));
        }
        Ok(Ok(session))
    }

    /// Audit a payload-validation failure and build the block reply.
    ///
    /// Bad input is a denial like any other: it lands in the log as
    /// `prey8.gate_blocked` so the watchdog sees it.
    fn invalid(&self, agent_id: &str, gate: Gate, reason: String) -> Result<PhaseReply> {
        warn!(agent_id, gate = gate.as_str(), reason, "payload rejected");
        let data = GateBlockedData {
            agent_id: agent_id.to_string(),
            gate,
            reason: reason.clone(),
        };
        let envelope = Envelope::new(
            EventData::GateBlocked(data.clone()).event_type(),
            &self.source,
            &format!("agent/{agent_id}"),
            EventData::GateBlocked(data).to_value()?,
        );
        let _ = self.store.append(&envelope)?;
        Ok(PhaseReply::Blocked(BlockReceipt {
            reason,
            tampered: false,
        }))
    }

    /// Whether the log already holds a yield record for this session.
    ///
    /// True for sessions the reaper closed on the agent's behalf: the live
    /// entry is stale and may be discarded.
    fn session_closed_in_log(&self, session_id: &str) -> Result<bool> {
        let subject = format!("session/{session_id}");
        let yields = self.store.get_by_type_prefix("prey8.yield", None)?;
        Ok(yields.iter().any(|row| row.subject == subject))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phases
    // ─────────────────────────────────────────────────────────────────────

    /// Open a session: record observations, mint the react nonce.
    #[instrument(skip(self, request))]
    pub fn perceive(&self, agent_id: &str, request: PerceiveRequest) -> Result<PhaseReply> {
        if let Some(blocked) = self.check_gate(agent_id, Gate::Perceive)? {
            return Ok(blocked);
        }
        if let Some(live) = self.sessions.get(agent_id) {
            // A session the reaper already closed is stale, not a violation:
            // drop it and let the agent start over.
            if self.session_closed_in_log(&live.session_id)? {
                warn!(
                    agent_id,
                    session_id = %live.session_id,
                    "discarding stale session already closed in the log"
                );
                let _ = self.sessions.remove(agent_id);
            } else {
                return self.tamper(
                    agent_id,
                    Some(live.session_id.as_str()),
                    Gate::Perceive,
                    &format!("perceive while session live in phase {}", live.phase),
                );
            }
        }

        let session_id = mint_session_id();
        let nonce = mint_credential();
        let data = PerceiveData {
            agent_id: agent_id.to_string(),
            session_id: session_id.clone(),
            nonce: nonce.clone(),
            probe: request.probe,
            observations: request.observations,
            memory_refs: request.memory_refs,
        };
        if let Err(reason) = data.validate() {
            return self.invalid(agent_id, Gate::Perceive, reason);
        }

        let envelope = Envelope::new(
            EventData::Perceive(data.clone()).event_type(),
            agent_id,
            &format!("session/{session_id}"),
            EventData::Perceive(data).to_value()?,
        );
        let outcome = self.store.append(&envelope)?;
        self.sessions
            .upsert(Session::open(agent_id, &session_id, &nonce));
        info!(agent_id, session_id, seq = outcome.seq, "session opened");

        Ok(PhaseReply::Advanced(PhaseReceipt {
            session_id,
            phase: Phase::Perceived,
            credential: Some(nonce),
            step: 0,
            content_hash: outcome.content_hash,
            seq: outcome.seq,
        }))
    }

    /// Commit to an analysis and plan; consumes the perceive nonce and
    /// mints the execute token.
    #[instrument(skip(self, request))]
    pub fn react(&self, agent_id: &str, request: ReactRequest) -> Result<PhaseReply> {
        if let Some(blocked) = self.check_gate(agent_id, Gate::React)? {
            return Ok(blocked);
        }
        let mut session = match self.check_session(agent_id, Gate::React)? {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };
        if session.perceive_nonce.as_deref() != Some(request.perceive_nonce.as_str()) {
            return self.tamper(
                agent_id,
                Some(session.session_id.as_str()),
                Gate::React,
                "perceive nonce mismatch",
            );
        }

        let token = mint_credential();
        let data = ReactData {
            agent_id: agent_id.to_string(),
            session_id: session.session_id.to_string(),
            perceive_nonce: request.perceive_nonce,
            token: token.clone(),
            analysis: request.analysis,
            navigation_intent: request.navigation_intent,
            meadows_level: request.meadows_level,
            sequential_plan: request.sequential_plan,
        };
        if let Err(reason) = data.validate() {
            return self.invalid(agent_id, Gate::React, reason);
        }

        let envelope = Envelope::new(
            EventData::React(data.clone()).event_type(),
            agent_id,
            &format!("session/{}", session.session_id),
            EventData::React(data).to_value()?,
        );
        let outcome = self.store.append(&envelope)?;
        session.advance(Phase::Reacted);
        session.perceive_nonce = None;
        session.react_token = Some(token.clone());
        let session_id = session.session_id.to_string();
        self.sessions.upsert(session);

        Ok(PhaseReply::Advanced(PhaseReceipt {
            session_id,
            phase: Phase::Reacted,
            credential: Some(token),
            step: 0,
            content_hash: outcome.content_hash,
            seq: outcome.seq,
        }))
    }

    /// Record one execution step. May repeat; the react token stays live
    /// across steps.
    #[instrument(skip(self, request))]
    pub fn execute(&self, agent_id: &str, request: ExecuteRequest) -> Result<PhaseReply> {
        if let Some(blocked) = self.check_gate(agent_id, Gate::Execute)? {
            return Ok(blocked);
        }
        let mut session = match self.check_session(agent_id, Gate::Execute)? {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };
        if session.react_token.as_deref() != Some(request.token.as_str()) {
            return self.tamper(
                agent_id,
                Some(session.session_id.as_str()),
                Gate::Execute,
                "react token mismatch",
            );
        }

        let step = session.execute_steps + 1;
        let data = ExecuteData {
            agent_id: agent_id.to_string(),
            session_id: session.session_id.to_string(),
            token: request.token,
            step,
            action_summary: request.action_summary,
            sbe: request.sbe,
            artifacts: request.artifacts,
            fail_closed_gate: request.fail_closed_gate,
        };
        if let Err(reason) = data.validate() {
            return self.invalid(agent_id, Gate::Execute, reason);
        }

        let envelope = Envelope::new(
            EventData::Execute(data.clone()).event_type(),
            agent_id,
            &format!("session/{}", session.session_id),
            EventData::Execute(data).to_value()?,
        );
        let outcome = self.store.append(&envelope)?;
        session.advance(Phase::Executing);
        session.execute_steps = step;
        let session_id = session.session_id.to_string();
        let token = session.react_token.clone();
        self.sessions.upsert(session);

        Ok(PhaseReply::Advanced(PhaseReceipt {
            session_id,
            phase: Phase::Executing,
            credential: token,
            step,
            content_hash: outcome.content_hash,
            seq: outcome.seq,
        }))
    }

    /// Close the session with a delivery summary. Terminal: the live
    /// session is removed; history stays in the log.
    #[instrument(skip(self, request))]
    pub fn yield_phase(&self, agent_id: &str, request: YieldRequest) -> Result<PhaseReply> {
        if let Some(blocked) = self.check_gate(agent_id, Gate::Yield)? {
            return Ok(blocked);
        }
        let session = match self.check_session(agent_id, Gate::Yield)? {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };
        if session.react_token.as_deref() != Some(request.token.as_str()) {
            return self.tamper(
                agent_id,
                Some(session.session_id.as_str()),
                Gate::Yield,
                "react token mismatch",
            );
        }

        let data = YieldData {
            agent_id: agent_id.to_string(),
            session_id: session.session_id.to_string(),
            token: request.token,
            summary: request.summary,
            immunization_status: request.immunization_status,
            mutation_confidence: request.mutation_confidence,
            completion: request.completion,
            reason: None,
        };
        if let Err(reason) = data.validate() {
            return self.invalid(agent_id, Gate::Yield, reason);
        }

        let envelope = Envelope::new(
            EventData::Yield(data.clone()).event_type(),
            agent_id,
            &format!("session/{}", session.session_id),
            EventData::Yield(data).to_value()?,
        );
        let outcome = self.store.append(&envelope)?;
        let steps = session.execute_steps;
        let session_id = session.session_id.to_string();
        let _ = self.sessions.remove(agent_id);
        info!(agent_id, session_id, steps, "session closed");

        Ok(PhaseReply::Advanced(PhaseReceipt {
            session_id,
            phase: Phase::Yielded,
            credential: None,
            step: steps,
            content_hash: outcome.content_hash,
            seq: outcome.seq,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
