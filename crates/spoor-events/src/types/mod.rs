//! Wire types: event type vocabulary and typed payloads.

pub mod event_type;
pub mod payloads;

pub use event_type::{ALL_EVENT_TYPES, EventType};
pub use payloads::{
    EventData, ExecuteData, FindingData, GateBlockedData, ImmunizationStatus, PerceiveData,
    ReactData, SbeContract, TamperAlertData, YieldData,
};
