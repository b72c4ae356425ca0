//! Testing infrastructure
//!
//! Scripted isolation backends for exercising supervisor paths that real
//! processes cannot reproduce on demand.

pub mod fake;

pub use fake::*;
