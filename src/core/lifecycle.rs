//! Run Lifecycle
//!
//! One supervised execution moves through a fixed sequence of states:
//!
//! Created -> Running -> Resolved -> Released
//!
//! Each step consumes the prior state and returns exactly one next state on
//! success. Only `Run<Released>` can classify the result and emit the event,
//! so an event can never be published while the execution context is still
//! held.
//!
//! Illegal orders (finishing before release, joining before launch, reusing
//! a consumed run) are rejected at compile time; see
//! `tests/typestate_compile_fail/`.

use crate::config::types::{Deadline, Result, SupervisorConfig, SupervisorError};
use crate::core::outcome::{classify_exit, Outcome};
use crate::core::timer::{StartMark, Timer};
use crate::exec::context::{
    ExecutionContext, ExitReport, IsolationBackend, Job, JoinStatus, ReleaseReport,
};
use crate::kernel::signal::KillReport;
use crate::observability::event::ExecutionEvent;
use crate::observability::sink::EventSink;
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Type-state marker: nothing launched yet
pub struct Created;

/// Type-state marker: context acknowledged launch, deadline clock running
pub struct Running;

/// Type-state marker: work finished in time, or was killed and confirmed gone
pub struct Resolved;

/// Type-state marker: every resource of the context was given back
pub struct Released;

/// How a running context was resolved.
#[derive(Debug)]
enum Resolution {
    Finished { report: ExitReport, elapsed: Duration },
    Overran { kill: KillReport, attempts: u32 },
}

/// One supervised execution, tracked by type state.
pub struct Run<S> {
    label: Option<String>,
    deadline: Deadline,
    context: Option<Box<dyn ExecutionContext>>,
    pid: Option<i32>,
    started: Option<StartMark>,
    resolution: Option<Resolution>,
    release: Option<ReleaseReport>,
    _state: PhantomData<S>,
}

impl<S> Run<S> {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    fn advance<N>(self) -> Run<N> {
        Run {
            label: self.label,
            deadline: self.deadline,
            context: self.context,
            pid: self.pid,
            started: self.started,
            resolution: self.resolution,
            release: self.release,
            _state: PhantomData,
        }
    }

    /// Release the context on an error path. Its own failure is only logged:
    /// the caller already has the error that matters.
    fn abandon(&mut self) {
        if let Some(mut context) = self.context.take() {
            match context.release() {
                Ok(report) if !report.reaped => {
                    warn!("Abandoned context {:?} was not reaped: {:?}", self.pid, report.notes)
                }
                Ok(_) => {}
                Err(e) => warn!("Release of abandoned context {:?} failed: {}", self.pid, e),
            }
        }
    }
}

impl<S> fmt::Debug for Run<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("state", &std::any::type_name::<S>())
            .field("label", &self.label)
            .field("deadline", &self.deadline)
            .field("pid", &self.pid)
            .finish()
    }
}

impl Run<Created> {
    pub fn new(label: Option<String>, deadline: Deadline) -> Self {
        Self {
            label,
            deadline,
            context: None,
            pid: None,
            started: None,
            resolution: None,
            release: None,
            _state: PhantomData,
        }
    }

    /// Launch the job and wait for the context to acknowledge it is running.
    /// The deadline clock starts at that acknowledgement, so launch latency
    /// never eats into the work's budget.
    pub fn launch(
        mut self,
        backend: &dyn IsolationBackend,
        job: Job<'_>,
        config: &SupervisorConfig,
    ) -> Result<Run<Running>> {
        let mut context = backend.launch(job, config)?;
        self.pid = context.pid();

        if let Err(e) = context.await_launch(config.launch_timeout()) {
            self.context = Some(context);
            self.abandon();
            return Err(e);
        }

        self.started = Some(Timer::start());
        self.context = Some(context);
        debug!(
            "Launched {:?} on {} backend (pid {:?}, deadline {})",
            self.label,
            backend.name(),
            self.pid,
            self.deadline
        );
        Ok(self.advance())
    }
}

impl Run<Running> {
    /// Wait for the work until the deadline; past it, kill the context and
    /// confirm it is gone.
    ///
    /// Returns [`SupervisorError::TerminationFailure`] when the context
    /// survives every kill attempt.
    pub fn join(mut self, config: &SupervisorConfig) -> Result<Run<Resolved>> {
        let status = match self.context.as_mut() {
            Some(context) => context.join(self.deadline.as_duration()),
            None => Err(missing_context()),
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                self.abandon();
                return Err(e);
            }
        };

        match status {
            JoinStatus::Finished(report) => {
                let elapsed = self
                    .started
                    .as_ref()
                    .map(Timer::elapsed_since)
                    .unwrap_or_default();
                self.resolution = Some(Resolution::Finished { report, elapsed });
                Ok(self.advance())
            }
            JoinStatus::Running => {
                debug!(
                    "{:?} (pid {:?}) overran its {} deadline; terminating",
                    self.label, self.pid, self.deadline
                );
                match self.terminate(config) {
                    Ok(resolution) => {
                        self.resolution = Some(resolution);
                        Ok(self.advance())
                    }
                    Err(e) => {
                        self.abandon();
                        Err(e)
                    }
                }
            }
        }
    }

    fn terminate(&mut self, config: &SupervisorConfig) -> Result<Resolution> {
        let attempts = config.kill_attempts();
        let confirm_within = config.kill_confirm_timeout();
        let context = self.context.as_mut().ok_or_else(missing_context)?;

        let mut last_kill = KillReport::default();
        for attempt in 1..=attempts {
            last_kill = context.force_terminate()?;
            if context.confirm_terminated(confirm_within)? {
                if attempt > 1 {
                    warn!(
                        "Context {:?} needed {} kill attempts to terminate",
                        self.pid, attempt
                    );
                }
                return Ok(Resolution::Overran {
                    kill: last_kill,
                    attempts: attempt,
                });
            }
            debug!(
                "Kill attempt {}/{} on {:?} not confirmed within {:?}",
                attempt, attempts, self.pid, confirm_within
            );
        }

        let pid = self.pid.unwrap_or(-1);
        error!(
            "Context pid {} survived {} SIGKILL attempts; last kill: {:?}",
            pid, attempts, last_kill
        );
        Err(SupervisorError::TerminationFailure { pid, attempts })
    }
}

impl Run<Resolved> {
    pub fn timed_out(&self) -> bool {
        matches!(self.resolution, Some(Resolution::Overran { .. }))
    }

    /// Number of kill attempts it took to stop an overrunning context.
    pub fn kill_attempts(&self) -> Option<u32> {
        match self.resolution {
            Some(Resolution::Overran { attempts, .. }) => Some(attempts),
            _ => None,
        }
    }

    pub fn kill_report(&self) -> Option<&KillReport> {
        match &self.resolution {
            Some(Resolution::Overran { kill, .. }) => Some(kill),
            _ => None,
        }
    }

    /// Give back the context's process, pipe and helper thread.
    pub fn release(mut self) -> Result<Run<Released>> {
        let mut context = self.context.take().ok_or_else(missing_context)?;
        let report = context.release()?;
        drop(context);

        if !report.notes.is_empty() {
            debug!("Release notes for pid {:?}: {:?}", self.pid, report.notes);
        }
        if !report.helpers_joined {
            warn!("Context {:?} released with a detached helper thread", self.pid);
        }
        self.release = Some(report);
        Ok(self.advance())
    }
}

impl Run<Released> {
    pub fn release_report(&self) -> Option<&ReleaseReport> {
        self.release.as_ref()
    }

    /// Classify the run, publish its event and hand back the outcome.
    pub fn finish<T, E>(self, sink: &dyn EventSink) -> Result<Outcome<T, E>>
    where
        T: DeserializeOwned,
        E: DeserializeOwned + fmt::Debug,
    {
        let outcome = match self.resolution {
            Some(Resolution::Finished { report, elapsed }) => classify_exit(report, elapsed)?,
            Some(Resolution::Overran { .. }) => Outcome::TimedOut {
                deadline: self.deadline,
            },
            None => return Err(missing_context()),
        };

        let event = ExecutionEvent::from_outcome(&outcome, self.label, self.pid);
        sink.emit(&event);
        Ok(outcome)
    }
}

fn missing_context() -> SupervisorError {
    SupervisorError::Protocol("run lost its execution context".to_string())
}
