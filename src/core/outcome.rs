use crate::config::types::{Deadline, Result};
use crate::exec::context::ExitReport;
use crate::exec::wire::{self, Report};
use crate::kernel::wait::ChildExit;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What went wrong inside the execution context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkError<E> {
    /// The work's own error, exactly as it returned it.
    Returned(E),
    Panicked { message: String },
    /// The context ended without reporting a result.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl<E: fmt::Debug> WorkError<E> {
    pub fn describe(&self) -> String {
        match self {
            WorkError::Returned(error) => format!("returned error {error:?}"),
            WorkError::Panicked { message } => format!("panicked: {message}"),
            WorkError::Exited {
                code: Some(code), ..
            } => format!("exited with code {code} without reporting a result"),
            WorkError::Exited {
                signal: Some(signal),
                ..
            } => format!("killed by signal {signal} without reporting a result"),
            WorkError::Exited { .. } => "vanished without reporting a result".to_string(),
        }
    }
}

impl<E> From<ChildExit> for WorkError<E> {
    fn from(exit: ChildExit) -> Self {
        WorkError::Exited {
            code: exit.code(),
            signal: exit.signal(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTag {
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeTag::Completed => "completed",
            OutcomeTag::Failed => "failed",
            OutcomeTag::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Classified result of one supervised execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<T, E> {
    Completed { value: T, elapsed: Duration },
    Failed { error: WorkError<E>, elapsed: Duration },
    /// Forcibly terminated at the deadline. Carries no partial result and no
    /// elapsed time.
    TimedOut { deadline: Deadline },
}

impl<T, E> Outcome<T, E> {
    pub fn tag(&self) -> OutcomeTag {
        match self {
            Outcome::Completed { .. } => OutcomeTag::Completed,
            Outcome::Failed { .. } => OutcomeTag::Failed,
            Outcome::TimedOut { .. } => OutcomeTag::TimedOut,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Completed { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Completed { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The work's own error, if it returned one.
    pub fn work_error(&self) -> Option<&E> {
        match self {
            Outcome::Failed {
                error: WorkError::Returned(error),
                ..
            } => Some(error),
            _ => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Outcome::Completed { elapsed, .. } | Outcome::Failed { elapsed, .. } => Some(*elapsed),
            Outcome::TimedOut { .. } => None,
        }
    }

    /// Elapsed time for finished work, the configured deadline for overruns.
    pub fn reported_duration(&self) -> Duration {
        match self {
            Outcome::TimedOut { deadline } => deadline.as_duration(),
            other => other.elapsed().unwrap_or_default(),
        }
    }
}

/// Turn what a finished context left behind into an outcome.
///
/// A decodable report always wins. Without one, the way the context ended is
/// the failure. An undecodable report from a cleanly exited context is a
/// protocol error rather than a work failure.
pub(crate) fn classify_exit<T, E>(report: ExitReport, elapsed: Duration) -> Result<Outcome<T, E>>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    if report.payload.is_empty() {
        return Ok(Outcome::Failed {
            error: WorkError::from(report.exit),
            elapsed,
        });
    }

    match wire::decode::<T, E>(&report.payload) {
        Ok(Report::Value(value)) => Ok(Outcome::Completed { value, elapsed }),
        Ok(Report::Error(error)) => Ok(Outcome::Failed {
            error: WorkError::Returned(error),
            elapsed,
        }),
        Ok(Report::Panic(message)) => Ok(Outcome::Failed {
            error: WorkError::Panicked { message },
            elapsed,
        }),
        Err(e) if report.exit.is_clean() => Err(e),
        Err(e) => {
            log::debug!("Ignoring undecodable report from unclean exit: {}", e);
            Ok(Outcome::Failed {
                error: WorkError::from(report.exit),
                elapsed,
            })
        }
    }
}
