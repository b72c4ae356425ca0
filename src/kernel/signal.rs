//! Forceful termination primitives.
//!
//! Termination is always SIGKILL: the supervised work gets no grace period and
//! no chance to flush state. Functions called from a freshly forked child
//! (`arm_parent_death_signal`) must not log or allocate beyond what the
//! syscall wrappers do.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Signal delivery report for one forced-termination attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillReport {
    pub kill_sent: bool,
    /// Target no longer existed when the signal was issued.
    pub already_gone: bool,
    pub signal_ms: u64,
    pub notes: Vec<String>,
}

/// SIGKILL the process group led by `leader`, falling back to the leader
/// alone when the group cannot be signalled.
pub fn kill_process_group(leader: Pid) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();

    match killpg(leader, Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(group_err) => {
            report
                .notes
                .push(format!("group SIGKILL failed ({group_err}), signalling leader"));
            match kill(leader, Signal::SIGKILL) {
                Ok(()) => report.kill_sent = true,
                Err(Errno::ESRCH) => report.already_gone = true,
                Err(e) => report.notes.push(format!("leader SIGKILL failed: {e}")),
            }
        }
    }

    report.signal_ms = start.elapsed().as_millis() as u64;
    report
}

/// SIGKILL whatever is left in the group `pgid` after its leader was reaped.
///
/// Never falls back to signalling `pgid` as a pid: once the leader is reaped
/// that pid may belong to someone else. ESRCH means the group is empty.
pub fn sweep_process_group(pgid: Pid) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();

    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(Errno::ESRCH) => report.already_gone = true,
        Err(e) => report.notes.push(format!("group SIGKILL failed: {e}")),
    }

    report.signal_ms = start.elapsed().as_millis() as u64;
    report
}

/// Ask the kernel to SIGKILL the calling process when the thread that forked
/// it exits. Returns false when the parent is already gone, in which case the
/// caller should exit immediately.
pub fn arm_parent_death_signal(expected_parent: Pid) -> bool {
    #[cfg(target_os = "linux")]
    {
        if nix::sys::prctl::set_pdeathsig(Signal::SIGKILL).is_err() {
            return false;
        }
    }

    nix::unistd::getppid() == expected_parent
}
