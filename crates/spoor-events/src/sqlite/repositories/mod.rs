//! Stateless repositories over the raw schema. Every method takes
//! `&Connection`; transaction scope belongs to the calling store.

pub mod journal;
pub mod signal;
