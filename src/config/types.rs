use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Maximum wall-clock time a unit of work may run, counted from the moment its
/// execution context acknowledged launch. Always strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Duration", into = "Duration")]
pub struct Deadline(Duration);

impl Deadline {
    pub fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(SupervisorError::Config(
                "deadline must be strictly positive, got 0s".to_string(),
            ));
        }
        Ok(Self(duration))
    }

    /// Build a deadline from fractional seconds, as accepted on the command line.
    /// Negative, zero, NaN and infinite values are rejected.
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(SupervisorError::Config(format!(
                "deadline must be a finite, strictly positive number of seconds, got {secs}"
            )));
        }
        let duration = Duration::try_from_secs_f64(secs).map_err(|e| {
            SupervisorError::Config(format!("deadline {secs}s is out of range: {e}"))
        })?;
        Self::new(duration)
    }

    pub fn from_millis(ms: u64) -> Result<Self> {
        Self::new(Duration::from_millis(ms))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl TryFrom<Duration> for Deadline {
    type Error = SupervisorError;

    fn try_from(duration: Duration) -> Result<Self> {
        Self::new(duration)
    }
}

impl From<Deadline> for Duration {
    fn from(deadline: Deadline) -> Self {
        deadline.0
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} s", self.0.as_secs_f64())
    }
}

/// Supervisor tuning knobs. Durations are stored in milliseconds so the
/// configuration file stays human-editable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long to wait for a forked context to acknowledge that it is running
    pub launch_timeout_ms: u64,
    /// Extra SIGKILL attempts after the first one fails to confirm termination
    pub kill_retries: u32,
    /// How long each kill attempt waits for the context to be reaped
    pub kill_confirm_timeout_ms: u64,
    /// Interval between non-blocking reap attempts
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for the status reader thread during release
    pub release_timeout_ms: u64,
    /// Label attached to events when the caller does not provide one
    pub default_label: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            launch_timeout_ms: 5_000,
            kill_retries: 3,
            kill_confirm_timeout_ms: 500,
            poll_interval_ms: 1,
            release_timeout_ms: 1_000,
            default_label: None,
        }
    }
}

impl SupervisorConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| {
            SupervisorError::Config(format!(
                "failed to parse supervisor config {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn kill_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }

    /// Total number of SIGKILL attempts made before giving up.
    pub fn kill_attempts(&self) -> u32 {
        self.kill_retries.saturating_add(1)
    }
}

/// Failures of a `run` call itself. Work errors and overruns are not errors;
/// they are reported as [`crate::Outcome`] data.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Termination failure: pid {pid} still not reaped after {attempts} SIGKILL attempts")]
    TerminationFailure { pid: i32, attempts: u32 },
}

impl SupervisorError {
    /// True for the leak condition the caller must escalate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorError::TerminationFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
