//! # spoor-protocol
//!
//! The PREY8 phase machine: Perceive → React → Execute → Yield, with
//! Execute free to repeat for multi-step work. The engine authorizes every
//! call against the agent registry (deny by default), chains phases with
//! minted nonces and tokens, and records every accepted phase — and every
//! denied attempt worth auditing — in the append-only signal log.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod session;

pub use engine::{
    BlockReceipt, ExecuteRequest, PerceiveRequest, PhaseReceipt, PhaseReply, ProtocolEngine,
    ReactRequest, YieldRequest,
};
pub use errors::{ProtocolError, Result};
pub use session::{InMemorySessionStore, Session, SessionStore};
