//! Execution-context capability.
//!
//! An execution context is one isolated, externally killable unit running a
//! single job. The supervisor drives it through launch confirmation, a
//! join-with-timeout, forced termination and release; it never assumes the
//! job cooperates with any of these steps.

use crate::config::types::{Result, SupervisorConfig};
use crate::kernel::signal::KillReport;
use crate::kernel::wait::ChildExit;
use std::time::Duration;

/// Work as handed to a backend: runs inside the context and returns the
/// encoded report (see [`crate::exec::wire`]). A forked context runs on its own
/// copy of the caller's memory, so the job may borrow from the caller.
pub type Job<'a> = Box<dyn FnOnce() -> Vec<u8> + 'a>;

/// Raw result of a context that finished on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExitReport {
    pub exit: ChildExit,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinStatus {
    Finished(ExitReport),
    /// Timeout elapsed first. Anything the context reports later is ignored.
    Running,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub pid: Option<i32>,
    /// The context was confirmed gone (reaped) when release finished.
    pub reaped: bool,
    /// Every helper thread owned by the context was joined.
    pub helpers_joined: bool,
    pub notes: Vec<String>,
}

pub trait ExecutionContext {
    /// OS identifier of the context, if it has one.
    fn pid(&self) -> Option<i32>;

    /// Block until the context confirms it is running.
    fn await_launch(&mut self, timeout: Duration) -> Result<()>;

    /// Block until the context finishes or `timeout` elapses, whichever is first.
    fn join(&mut self, timeout: Duration) -> Result<JoinStatus>;

    /// Issue one non-cooperative kill.
    fn force_terminate(&mut self) -> Result<KillReport>;

    /// Wait up to `within` for the context to be confirmed gone.
    fn confirm_terminated(&mut self, within: Duration) -> Result<bool>;

    /// Release every resource the context holds. Idempotent.
    fn release(&mut self) -> Result<ReleaseReport>;
}

/// Factory for execution contexts.
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn launch<'a>(
        &self,
        job: Job<'a>,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn ExecutionContext>>;
}
