//! Supervision core.
//!
//! Timing, outcome classification, the per-run lifecycle and the
//! [`supervisor::Supervisor`] facade that ties them together.

pub mod lifecycle;
pub mod outcome;
pub mod supervisor;
pub mod timer;
