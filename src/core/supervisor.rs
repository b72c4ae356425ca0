use crate::config::types::{Deadline, Result, SupervisorConfig};
use crate::config::validator::validate_config;
use crate::core::lifecycle::Run;
use crate::core::outcome::Outcome;
use crate::exec::context::IsolationBackend;
use crate::exec::process::ForkBackend;
use crate::exec::wire;
use crate::observability::sink::{EventSink, LogSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Runs work in an isolated process under a hard wall-clock deadline.
///
/// Each `run` call launches a fresh context, waits for it until the deadline,
/// kills it on overrun, releases it, emits exactly one event to the sink and
/// returns the [`Outcome`]. Calls are independent; a `Supervisor` can be
/// shared across threads.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use timebox::{MemorySink, Supervisor};
///
/// let sink = Arc::new(MemorySink::new());
/// let supervisor = Supervisor::new(sink.clone());
/// let outcome = supervisor
///     .run(|| Ok::<u64, String>(6 * 7), Duration::from_secs(1))
///     .unwrap();
/// assert_eq!(outcome.value(), Some(&42));
/// assert_eq!(sink.len(), 1);
/// ```
pub struct Supervisor {
    backend: Box<dyn IsolationBackend>,
    sink: Arc<dyn EventSink>,
    config: SupervisorConfig,
}

impl Supervisor {
    /// Fork-backed supervisor with default settings.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            backend: Box::new(ForkBackend::new()),
            sink,
            config: SupervisorConfig::default(),
        }
    }

    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::default()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn run<T, E, F>(&self, work: F, deadline: Duration) -> Result<Outcome<T, E>>
    where
        T: Serialize + DeserializeOwned,
        E: Serialize + DeserializeOwned + fmt::Debug,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.run_with_deadline(None, work, Deadline::new(deadline)?)
    }

    /// Like [`Supervisor::run`], tagging the emitted event with `label`.
    pub fn run_labeled<T, E, F>(
        &self,
        label: &str,
        work: F,
        deadline: Duration,
    ) -> Result<Outcome<T, E>>
    where
        T: Serialize + DeserializeOwned,
        E: Serialize + DeserializeOwned + fmt::Debug,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.run_with_deadline(Some(label), work, Deadline::new(deadline)?)
    }

    pub fn run_with_deadline<T, E, F>(
        &self,
        label: Option<&str>,
        work: F,
        deadline: Deadline,
    ) -> Result<Outcome<T, E>>
    where
        T: Serialize + DeserializeOwned,
        E: Serialize + DeserializeOwned + fmt::Debug,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let label = label
            .map(str::to_string)
            .or_else(|| self.config.default_label.clone());

        Run::new(label, deadline)
            .launch(
                self.backend.as_ref(),
                Box::new(move || wire::encode_result(work())),
                &self.config,
            )?
            .join(&self.config)?
            .release()?
            .finish(self.sink.as_ref())
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Assembles a [`Supervisor`]. Defaults: fork backend, [`LogSink`], default
/// config.
#[derive(Default)]
pub struct SupervisorBuilder {
    backend: Option<Box<dyn IsolationBackend>>,
    sink: Option<Arc<dyn EventSink>>,
    config: Option<SupervisorConfig>,
}

impl SupervisorBuilder {
    pub fn backend(mut self, backend: impl IsolationBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate the configuration and build. Warnings are logged; errors are
    /// returned as [`crate::SupervisorError::Config`].
    pub fn build(self) -> Result<Supervisor> {
        let config = self.config.unwrap_or_default();
        let validation = validate_config(&config)?;
        for warning in &validation.warnings {
            log::warn!("Supervisor config: {}", warning);
        }

        Ok(Supervisor {
            backend: self
                .backend
                .unwrap_or_else(|| Box::new(ForkBackend::new())),
            sink: self.sink.unwrap_or_else(|| Arc::new(LogSink::new())),
            config,
        })
    }
}
