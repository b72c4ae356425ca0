//! Event sinks.
//!
//! The supervisor emits exactly one [`ExecutionEvent`] per `run` call into an
//! injected sink. It never configures where events land; sinks decide that.
//! Every sink shipped here returns promptly: emission happens on the caller's
//! thread after the context was released, so a slow sink delays `run`'s
//! return but never the deadline itself.

use crate::config::types::Result;
use crate::core::outcome::OutcomeTag;
use crate::observability::event::ExecutionEvent;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, Level};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ExecutionEvent);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes events to the `log` facade.
#[derive(Debug, Clone)]
pub struct LogSink {
    fallback_label: String,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            fallback_label: "work".to_string(),
        }
    }

    pub fn with_fallback_label(label: impl Into<String>) -> Self {
        Self {
            fallback_label: label.into(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    /// Level and text of the record `emit` writes for `event`.
    fn record(&self, event: &ExecutionEvent) -> (Level, String) {
        let label = event.label_or(&self.fallback_label);
        let secs = event.duration.as_secs_f64();
        match event.outcome {
            OutcomeTag::Completed => (
                Level::Info,
                format!("Function '{}' was executed in {:.3} s", label, secs),
            ),
            OutcomeTag::Failed => (
                Level::Warn,
                format!(
                    "Function '{}' failed after {:.3} s: {}",
                    label,
                    secs,
                    event.failure.as_deref().unwrap_or("unknown failure")
                ),
            ),
            OutcomeTag::TimedOut => (
                Level::Warn,
                format!(
                    "Execution of '{}' was terminated due to exceeding {:.1} s time quota",
                    label, secs
                ),
            ),
        }
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: &ExecutionEvent) {
        let (level, message) = self.record(event);
        log::log!(level, "{}", message);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ExecutionEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Appends one JSON document per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &ExecutionEvent) {
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode execution event {}: {}", event.run_id, e);
                return;
            }
        };
        line.push(b'\n');

        let mut file = lock(&self.file);
        if let Err(e) = file.write_all(&line) {
            error!(
                "Failed to append execution event to {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Fire-and-forget hand-off to another thread. Never blocks: when the bounded
/// channel is full or its receiver is gone, the event is dropped and counted.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<ExecutionEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<ExecutionEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &ExecutionEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event channel full; dropped event {}", dropped.run_id);
            }
            Err(TrySendError::Disconnected(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event receiver gone; dropped event {}", dropped.run_id);
            }
        }
    }
}

/// Forwards every event to each inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &ExecutionEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
