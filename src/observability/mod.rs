//! Observability
//!
//! Structured execution events and the sinks that receive them.

pub mod event;
pub mod sink;
