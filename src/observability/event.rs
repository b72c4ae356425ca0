use crate::core::outcome::{Outcome, OutcomeTag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// One record per supervised execution, emitted after its context was released.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub run_id: Uuid,
    pub label: Option<String>,
    pub outcome: OutcomeTag,
    /// Elapsed time for completed/failed work, the configured deadline for
    /// timed-out work.
    pub duration: Duration,
    /// Pid of the released execution context.
    pub pid: Option<i32>,
    /// Description of the failure; never the raw work error value.
    pub failure: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn from_outcome<T, E: fmt::Debug>(
        outcome: &Outcome<T, E>,
        label: Option<String>,
        pid: Option<i32>,
    ) -> Self {
        let failure = match outcome {
            Outcome::Failed { error, .. } => Some(error.describe()),
            _ => None,
        };

        Self {
            run_id: Uuid::new_v4(),
            label,
            outcome: outcome.tag(),
            duration: outcome.reported_duration(),
            pid,
            failure,
            timestamp: Utc::now(),
        }
    }

    pub fn label_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.label.as_deref().unwrap_or(fallback)
    }
}
