//! High-level stores over the signal log and the journal.

pub mod event_store;
pub mod journal_store;
