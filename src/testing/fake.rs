//! In-process isolation backend with scripted behaviour.
//!
//! Lets tests drive paths a real fork cannot produce on demand: a context
//! that never acknowledges launch, one that shrugs off SIGKILL, or a slow
//! launch. Every interaction is recorded in [`FakeStats`].

use crate::config::types::{Result, SupervisorConfig, SupervisorError};
use crate::exec::context::{
    ExecutionContext, ExitReport, IsolationBackend, Job, JoinStatus, ReleaseReport,
};
use crate::kernel::signal::KillReport;
use crate::kernel::wait::ChildExit;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

// Well above any pid_max, so fake pids never name a live process.
static NEXT_FAKE_PID: AtomicI32 = AtomicI32::new(1 << 23);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeMode {
    /// Run the job during launch; join reports its payload immediately.
    Inline,
    /// Never finish; dies on the first kill.
    Hang,
    /// Never finish and never die.
    Unkillable,
    /// Never acknowledge launch.
    NeverAck,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FakeStats {
    pub launches: u32,
    pub releases: u32,
    pub kill_attempts: u32,
    /// Timeout passed to every join call, in order.
    pub join_timeouts: Vec<Duration>,
}

#[derive(Clone, Debug)]
pub struct FakeBackend {
    mode: FakeMode,
    launch_delay: Duration,
    stats: Arc<Mutex<FakeStats>>,
}

impl FakeBackend {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            launch_delay: Duration::ZERO,
            stats: Arc::new(Mutex::new(FakeStats::default())),
        }
    }

    /// Delay every launch acknowledgement by `delay`.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Snapshot of everything recorded so far, across all contexts.
    pub fn stats(&self) -> FakeStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl IsolationBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn launch<'a>(
        &self,
        job: Job<'a>,
        _config: &SupervisorConfig,
    ) -> Result<Box<dyn ExecutionContext>> {
        record(&self.stats, |s| s.launches += 1);

        let payload = match self.mode {
            FakeMode::Inline => Some(job()),
            _ => None,
        };

        Ok(Box::new(FakeContext {
            pid: NEXT_FAKE_PID.fetch_add(1, Ordering::Relaxed),
            mode: self.mode,
            launch_delay: self.launch_delay,
            payload,
            killed: false,
            released: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

fn record(stats: &Mutex<FakeStats>, update: impl FnOnce(&mut FakeStats)) {
    update(&mut stats.lock().unwrap_or_else(PoisonError::into_inner));
}

struct FakeContext {
    pid: i32,
    mode: FakeMode,
    launch_delay: Duration,
    payload: Option<Vec<u8>>,
    killed: bool,
    released: bool,
    stats: Arc<Mutex<FakeStats>>,
}

impl FakeContext {
    fn gone(&self) -> bool {
        self.mode == FakeMode::Inline || (self.killed && self.mode != FakeMode::Unkillable)
    }
}

impl ExecutionContext for FakeContext {
    fn pid(&self) -> Option<i32> {
        Some(self.pid)
    }

    fn await_launch(&mut self, timeout: Duration) -> Result<()> {
        if self.mode == FakeMode::NeverAck {
            thread::sleep(timeout);
            return Err(SupervisorError::Launch(format!(
                "fake pid {} did not acknowledge launch within {:?}",
                self.pid, timeout
            )));
        }
        thread::sleep(self.launch_delay);
        Ok(())
    }

    fn join(&mut self, timeout: Duration) -> Result<JoinStatus> {
        record(&self.stats, |s| s.join_timeouts.push(timeout));

        match self.payload.take() {
            Some(payload) => Ok(JoinStatus::Finished(ExitReport {
                exit: ChildExit::Exited(0),
                payload,
            })),
            None => {
                thread::sleep(timeout);
                Ok(JoinStatus::Running)
            }
        }
    }

    fn force_terminate(&mut self) -> Result<KillReport> {
        record(&self.stats, |s| s.kill_attempts += 1);
        self.killed = true;
        Ok(KillReport {
            kill_sent: true,
            ..KillReport::default()
        })
    }

    fn confirm_terminated(&mut self, within: Duration) -> Result<bool> {
        if self.gone() {
            return Ok(true);
        }
        thread::sleep(within);
        Ok(false)
    }

    fn release(&mut self) -> Result<ReleaseReport> {
        if !self.released {
            self.released = true;
            record(&self.stats, |s| s.releases += 1);
        }
        Ok(ReleaseReport {
            pid: Some(self.pid),
            reaped: self.gone(),
            helpers_joined: true,
            notes: Vec::new(),
        })
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
