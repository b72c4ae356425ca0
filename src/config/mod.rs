//! Configuration
//!
//! Deadline and supervisor settings, the crate error type, and startup validation.

pub mod types;
pub mod validator;
