//! # spoor-core
//!
//! Foundation types for the spoor coordination core:
//!
//! - **Branded IDs**: newtype wrappers preventing ID mixups across subsystems
//! - **Gate/phase vocabulary**: the four protocol gates and five session phases
//! - **Agent registry**: deny-by-default authorization with explicit decisions

#![deny(unsafe_code)]

pub mod gate;
pub mod ids;
pub mod logging;
pub mod registry;

pub use gate::{Gate, Phase};
pub use ids::{AgentId, EventId, SessionId};
pub use registry::{AgentIdentity, AgentRegistry, Decision};
