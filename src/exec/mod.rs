//! Execution control
//!
//! Isolated execution contexts: the backend/context capability, the
//! fork-based implementation, and the status pipe protocol between them.

pub mod context;
pub mod process;
pub mod wire;
