//! Protocol gates and session phases.
//!
//! A [`Gate`] is an operation an agent may invoke; a [`Phase`] is where a
//! live session currently sits. The engine advances phases strictly in
//! order: Idle → Perceived → Reacted → Executing → Yielded, with Executing
//! permitted to repeat for multi-step work.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four protocol gates, in invocation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    /// Open a session and record observations.
    Perceive,
    /// Commit to an analysis and plan.
    React,
    /// Record an execution step (may repeat).
    Execute,
    /// Close the session with a delivery summary.
    Yield,
}

impl Gate {
    /// Wire string for this gate.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perceive => "perceive",
            Self::React => "react",
            Self::Execute => "execute",
            Self::Yield => "yield",
        }
    }

    /// All gates in protocol order.
    pub const ALL: [Gate; 4] = [Gate::Perceive, Gate::React, Gate::Execute, Gate::Yield];
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perceive" => Ok(Self::Perceive),
            "react" => Ok(Self::React),
            "execute" => Ok(Self::Execute),
            "yield" => Ok(Self::Yield),
            other => Err(format!("unknown gate: {other}")),
        }
    }
}

/// Session lifecycle phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// No live session.
    #[default]
    Idle,
    /// Perceive accepted; waiting for react.
    Perceived,
    /// React accepted; waiting for execute.
    Reacted,
    /// At least one execute accepted; execute may repeat or yield may close.
    Executing,
    /// Terminal. The session has been closed and removed from the live set.
    Yielded,
}

impl Phase {
    /// Whether a session in this phase accepts the given gate.
    #[must_use]
    pub fn accepts(self, gate: Gate) -> bool {
        matches!(
            (self, gate),
            (Self::Idle, Gate::Perceive)
                | (Self::Perceived, Gate::React)
                | (Self::Reacted | Self::Executing, Gate::Execute)
                | (Self::Executing, Gate::Yield)
        )
    }

    /// The phase a session enters after the given gate is accepted.
    #[must_use]
    pub fn after(gate: Gate) -> Self {
        match gate {
            Gate::Perceive => Self::Perceived,
            Gate::React => Self::Reacted,
            Gate::Execute => Self::Executing,
            Gate::Yield => Self::Yielded,
        }
    }

    /// Wire string for this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Perceived => "PERCEIVED",
            Self::Reacted => "REACTED",
            Self::Executing => "EXECUTING",
            Self::Yielded => "YIELDED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
