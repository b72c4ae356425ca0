//! timebox: run a unit of work under a hard wall-clock deadline
//!
//! Work runs in a forked process. If it overruns its deadline the process
//! group is SIGKILLed; the work gets no say in the matter.
//!
//! # Architecture
//!
//! ## Supervision Core ([`core`])
//! - [`core::supervisor`]: the `Supervisor` facade and its builder
//! - [`core::lifecycle`]: type-state run lifecycle (launch, join, release, finish)
//! - [`core::outcome`]: `Outcome` / `WorkError` classification
//! - [`core::timer`]: monotonic timing and profiling
//!
//! ## Execution Control ([`exec`])
//! - [`exec::context`]: execution-context and isolation-backend capabilities
//! - [`exec::process`]: fork-based backend
//! - [`exec::wire`]: status pipe protocol between parent and child
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::signal`]: SIGKILL delivery and parent-death signal
//! - [`kernel::wait`]: non-blocking reaping
//!
//! ## Observability ([`observability`])
//! - [`observability::event`]: one structured event per run
//! - [`observability::sink`]: log, memory, JSON-lines, channel and fan-out sinks
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: `Deadline`, `SupervisorConfig`, `SupervisorError`
//! - [`config::validator`]: startup validation of supervisor settings
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::fake`]: scripted in-process backend
//!
//! # Guarantees
//!
//! 1. **Exactly one outcome** - every successful `run` yields `Completed`,
//!    `Failed` or `TimedOut`; a work error never becomes a `run` error
//! 2. **Deadline from launch** - the clock starts when the child confirms it is running
//! 3. **Kernel as truth** - a context counts as gone only once it was reaped
//! 4. **Release before emit** - the event is published after every resource
//!    of the run was given back
//! 5. **Loud leaks** - a context that survives SIGKILL is a `TerminationFailure`,
//!    never a quiet `TimedOut`

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Supervision core
pub mod core;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Sample workloads
pub mod workload;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the timebox binary.
pub mod cli;

pub use crate::config::types::{Deadline, Result, SupervisorConfig, SupervisorError};
pub use crate::core::outcome::{Outcome, OutcomeTag, WorkError};
pub use crate::core::supervisor::{Supervisor, SupervisorBuilder};
pub use crate::core::timer::{StartMark, Timer};
pub use crate::exec::context::{ExecutionContext, IsolationBackend};
pub use crate::exec::process::ForkBackend;
pub use crate::observability::event::ExecutionEvent;
pub use crate::observability::sink::{
    ChannelSink, EventSink, FanoutSink, JsonLinesSink, LogSink, MemorySink,
};
