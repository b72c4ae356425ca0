//! Kernel primitives
//!
//! Thin wrappers over the process-control syscalls the supervisor relies on:
//! - [`signal`]: SIGKILL delivery and parent-death signal arming
//! - [`wait`]: non-blocking reaping and liveness checks

pub mod signal;
pub mod wait;
