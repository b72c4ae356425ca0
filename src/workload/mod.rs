//! Sample workloads
//!
//! CPU-bound work used by the `timebox` binary and the benchmarks.

pub mod prime;
