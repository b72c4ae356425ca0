//! Fork-based execution contexts.
//!
//! Each launch forks the caller. The child moves into its own process group,
//! arms a parent-death SIGKILL, acknowledges launch over a status pipe, runs
//! the job and `_exit`s. The parent side owns the pid, the read end of the
//! pipe (drained by one reader thread into a channel) and reaps the child.

use crate::config::types::{Result, SupervisorConfig, SupervisorError};
use crate::exec::context::{
    ExecutionContext, ExitReport, IsolationBackend, Job, JoinStatus, ReleaseReport,
};
use crate::exec::wire;
use crate::kernel::signal::{
    arm_parent_death_signal, kill_process_group, sweep_process_group, KillReport,
};
use crate::kernel::wait::{try_reap, ChildExit};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use nix::fcntl::OFlag;
use nix::unistd::{fork, getpid, pipe2, setpgid, ForkResult, Pid};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Child could not write to the status pipe.
const EXIT_REPORT_FAILED: i32 = 125;
/// Parent was gone before the parent-death signal was armed.
const EXIT_ORPHANED: i32 = 126;

/// Longest single wait of the status reader before it rechecks its stop flag.
const READER_POLL_MS: i32 = 50;

// Held from pipe creation until the parent has closed its write end, so no
// concurrently forked child inherits another context's write end.
static FORK_LOCK: Mutex<()> = Mutex::new(());

fn launch_error(prefix: &str, err: impl std::fmt::Display) -> SupervisorError {
    SupervisorError::Launch(format!("{prefix}: {err}"))
}

/// `None` when `timeout` reaches past what `Instant` can represent; callers
/// treat that as waiting without a deadline.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

enum PipeEvent {
    Launched,
    Report(Vec<u8>),
    /// Pipe closed without a complete report.
    Closed,
    ReadFailed(String),
}

/// Launches each job in a freshly forked process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForkBackend;

impl ForkBackend {
    pub fn new() -> Self {
        Self
    }
}

impl IsolationBackend for ForkBackend {
    fn name(&self) -> &'static str {
        "fork"
    }

    fn launch<'a>(
        &self,
        job: Job<'a>,
        config: &SupervisorConfig,
    ) -> Result<Box<dyn ExecutionContext>> {
        let parent = getpid();
        let guard = FORK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let (read_end, write_end) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| launch_error("pipe2(status)", e))?;

        // SAFETY: the child branch never returns into the caller's frames; it
        // runs the job and leaves through `_exit`.
        let child = match unsafe { fork() }.map_err(|e| launch_error("fork(work)", e))? {
            ForkResult::Child => {
                drop(read_end);
                run_child(job, write_end, parent)
            }
            ForkResult::Parent { child } => child,
        };

        drop(write_end);
        drop(guard);

        // Same call as the child makes; whichever runs first creates the group.
        let _ = setpgid(child, child);
        log::debug!("Forked work context pid {}", child);

        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let pipe = StatusPipe {
            pipe: File::from(read_end),
            stop: Arc::clone(&stop),
        };
        let reader = match spawn_status_reader(child, pipe, tx) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = kill_process_group(child);
                let _ = nix::sys::wait::waitpid(child, None);
                return Err(launch_error("spawn(status reader)", e));
            }
        };

        Ok(Box::new(ProcessContext::new(child, rx, reader, stop, config)))
    }
}

/// Child side. Must not log: another parent thread may have held the logger
/// lock at fork time.
fn run_child(job: Job<'_>, status: OwnedFd, parent: Pid) -> ! {
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    if !arm_parent_death_signal(parent) {
        unsafe { libc::_exit(EXIT_ORPHANED) }
    }

    let mut pipe = File::from(status);
    if wire::write_ack(&mut pipe).is_err() {
        unsafe { libc::_exit(EXIT_REPORT_FAILED) }
    }

    let report = match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(report) => report,
        Err(payload) => wire::encode_panic(&wire::panic_message(payload.as_ref())),
    };

    let code = match wire::write_frame(&mut pipe, &report) {
        Ok(()) => 0,
        Err(_) => EXIT_REPORT_FAILED,
    };
    unsafe { libc::_exit(code) }
}

/// Read end of the status pipe. Reads block until data, EOF or `stop`.
///
/// A descendant that left the process group can keep the write end open
/// forever; `stop` is how release gets the reader thread back anyway.
struct StatusPipe {
    pipe: File,
    stop: Arc<AtomicBool>,
}

impl Read for StatusPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.stop.load(Ordering::Acquire) {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "status reader stopped by release",
                ));
            }

            let mut pfd = libc::pollfd {
                fd: self.pipe.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let ret = unsafe { libc::poll(&mut pfd, 1, READER_POLL_MS) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ret > 0 {
                // Data, hangup or error: the read itself tells which.
                return self.pipe.read(buf);
            }
        }
    }
}

fn spawn_status_reader(
    pid: Pid,
    mut pipe: StatusPipe,
    tx: Sender<PipeEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("timebox-status-{pid}"))
        .spawn(move || {
            match wire::read_ack(&mut pipe) {
                Ok(true) => {
                    let _ = tx.send(PipeEvent::Launched);
                }
                Ok(false) => {
                    let _ = tx.send(PipeEvent::Closed);
                    return;
                }
                Err(e) => {
                    let _ = tx.send(PipeEvent::ReadFailed(e.to_string()));
                    return;
                }
            }

            let event = match wire::read_frame(&mut pipe) {
                Ok(Some(payload)) => PipeEvent::Report(payload),
                Ok(None) => PipeEvent::Closed,
                Err(e) => PipeEvent::ReadFailed(e.to_string()),
            };
            let _ = tx.send(event);
        })
}

/// Parent-side handle of one forked work process.
pub struct ProcessContext {
    pid: Pid,
    events: Receiver<PipeEvent>,
    reader: Option<JoinHandle<()>>,
    stop_reader: Arc<AtomicBool>,
    launched: bool,
    /// Report (or its absence) seen before the exit was reaped.
    pending: Option<Vec<u8>>,
    exit: Option<ChildExit>,
    poll_interval: Duration,
    release_timeout: Duration,
    released: bool,
}

impl ProcessContext {
    fn new(
        pid: Pid,
        events: Receiver<PipeEvent>,
        reader: JoinHandle<()>,
        stop_reader: Arc<AtomicBool>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            pid,
            events,
            reader: Some(reader),
            stop_reader,
            launched: false,
            pending: None,
            exit: None,
            poll_interval: config.poll_interval(),
            release_timeout: config.release_timeout(),
            released: false,
        }
    }

    fn try_reap(&mut self) -> Result<Option<ChildExit>> {
        if self.exit.is_none() {
            self.exit = try_reap(self.pid)?;
            if let Some(exit) = self.exit {
                log::debug!("Reaped work context pid {}: {:?}", self.pid, exit);
            }
        }
        Ok(self.exit)
    }

    fn reap_until(&mut self, deadline: Option<Instant>) -> Result<Option<ChildExit>> {
        loop {
            if let Some(exit) = self.try_reap()? {
                return Ok(Some(exit));
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            thread::sleep(pause);
        }
    }

    fn wait_for_reader(&mut self) -> bool {
        let Some(handle) = self.reader.take() else {
            return true;
        };

        // Nothing on the pipe matters once the context is being released.
        self.stop_reader.store(true, Ordering::Release);
        let deadline = deadline_after(self.release_timeout);
        while !handle.is_finished() && deadline.map_or(true, |d| Instant::now() < d) {
            thread::sleep(self.poll_interval);
        }

        if handle.is_finished() {
            let _ = handle.join();
            true
        } else {
            log::warn!(
                "Status reader for pid {} did not finish within {:?}; detaching it",
                self.pid,
                self.release_timeout
            );
            false
        }
    }
}

impl ExecutionContext for ProcessContext {
    fn pid(&self) -> Option<i32> {
        Some(self.pid.as_raw())
    }

    fn await_launch(&mut self, timeout: Duration) -> Result<()> {
        if self.launched {
            return Ok(());
        }

        match self.events.recv_timeout(timeout) {
            Ok(PipeEvent::Launched) => {
                self.launched = true;
                Ok(())
            }
            Ok(PipeEvent::Closed) => {
                // Died before acknowledging; join reports how it ended.
                self.launched = true;
                self.pending = Some(Vec::new());
                Ok(())
            }
            Ok(PipeEvent::Report(_)) => Err(SupervisorError::Protocol(format!(
                "pid {} sent a report before acknowledging launch",
                self.pid
            ))),
            Ok(PipeEvent::ReadFailed(msg)) => Err(SupervisorError::Launch(format!(
                "status pipe of pid {}: {msg}",
                self.pid
            ))),
            Err(RecvTimeoutError::Timeout) => Err(SupervisorError::Launch(format!(
                "pid {} did not acknowledge launch within {:?}",
                self.pid, timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(SupervisorError::Launch(format!(
                "status reader of pid {} exited before launch acknowledgement",
                self.pid
            ))),
        }
    }

    fn join(&mut self, timeout: Duration) -> Result<JoinStatus> {
        let deadline = deadline_after(timeout);
        let next_event = |events: &Receiver<PipeEvent>| match deadline {
            Some(deadline) => events.recv_deadline(deadline),
            None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let payload = match self.pending.take() {
            Some(payload) => payload,
            None => match next_event(&self.events) {
                Ok(PipeEvent::Report(payload)) => payload,
                Ok(PipeEvent::Closed) | Err(RecvTimeoutError::Disconnected) => Vec::new(),
                Ok(PipeEvent::Launched) => {
                    return Err(SupervisorError::Protocol(format!(
                        "pid {} acknowledged launch twice",
                        self.pid
                    )))
                }
                Ok(PipeEvent::ReadFailed(msg)) => {
                    return Err(SupervisorError::Protocol(format!(
                        "status pipe of pid {}: {msg}",
                        self.pid
                    )))
                }
                Err(RecvTimeoutError::Timeout) => return Ok(JoinStatus::Running),
            },
        };

        // The report is in; the process itself must also be gone before the
        // deadline for this branch to win.
        match self.reap_until(deadline)? {
            Some(exit) => Ok(JoinStatus::Finished(ExitReport { exit, payload })),
            None => Ok(JoinStatus::Running),
        }
    }

    fn force_terminate(&mut self) -> Result<KillReport> {
        if let Some(exit) = self.try_reap()? {
            return Ok(KillReport {
                already_gone: true,
                notes: vec![format!("already reaped: {exit:?}")],
                ..KillReport::default()
            });
        }

        let report = kill_process_group(self.pid);
        log::debug!("SIGKILL issued to process group {}: {:?}", self.pid, report);
        Ok(report)
    }

    fn confirm_terminated(&mut self, within: Duration) -> Result<bool> {
        Ok(self.reap_until(deadline_after(within))?.is_some())
    }

    fn release(&mut self) -> Result<ReleaseReport> {
        let mut report = ReleaseReport {
            pid: Some(self.pid.as_raw()),
            ..ReleaseReport::default()
        };

        if self.released {
            report.reaped = self.exit.is_some();
            report.helpers_joined = self.reader.is_none();
            return Ok(report);
        }
        self.released = true;

        if self.exit.is_none() {
            report
                .notes
                .push("context released while still running; killing it".to_string());
            let kill = kill_process_group(self.pid);
            report.notes.extend(kill.notes);
            if let Err(e) = self.reap_until(deadline_after(self.release_timeout)) {
                report.notes.push(format!("reap failed: {e}"));
            }
        }

        // The leader is gone but anything it started in its group may not be.
        // The group id stays reserved while members remain, so this never
        // reaches an unrelated process.
        if self.exit.is_some() {
            let sweep = sweep_process_group(self.pid);
            if sweep.kill_sent {
                report
                    .notes
                    .push("killed leftover members of the process group".to_string());
            }
            report.notes.extend(sweep.notes);
        }

        report.reaped = self.exit.is_some();
        report.helpers_joined = self.wait_for_reader();
        Ok(report)
    }
}

impl Drop for ProcessContext {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release() {
                log::warn!("Release of pid {} on drop failed: {}", self.pid, e);
            }
        }
    }
}
