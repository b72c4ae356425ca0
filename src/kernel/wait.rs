use crate::config::types::{Result, SupervisorError};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

/// How a reaped child ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
    /// Reaped by someone else (e.g. SIGCHLD set to SIG_IGN by the host), so
    /// the status is unavailable but the process is gone.
    Vanished,
}

impl ChildExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, ChildExit::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ChildExit::Exited(code) => Some(*code),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ChildExit::Signaled(sig) => Some(*sig),
            _ => None,
        }
    }
}

/// Non-blocking reap. `Ok(None)` means the child is still running (or was
/// interrupted mid-call and should be polled again).
pub fn try_reap(pid: Pid) -> Result<Option<ChildExit>> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => Ok(None),
        Ok(WaitStatus::Exited(_, code)) => Ok(Some(ChildExit::Exited(code))),
        Ok(WaitStatus::Signaled(_, sig, _)) => Ok(Some(ChildExit::Signaled(sig as i32))),
        Ok(_) => Ok(None),
        Err(Errno::EINTR) => Ok(None),
        Err(Errno::ECHILD) => Ok(Some(ChildExit::Vanished)),
        Err(e) => Err(SupervisorError::Io(std::io::Error::from(e))),
    }
}

/// True while `pid` names a live (or not yet reaped) process.
pub fn process_exists(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
