//! Run event log
//!
//! Collects the events of one run in memory. The executor drains them into
//! the run report once the run is finished.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use strata_core::domain::log::{LogEntry, LogLevel};

/// Sink for the audit events of a run
pub trait EventSink: Send + Sync {
    fn add_entry(&self, entry: LogEntry);

    /// Returns all buffered entries and clears the buffer
    fn drain(&self) -> Vec<LogEntry>;

    fn record(&self, level: LogLevel, stage: Option<&str>, message: String) {
        self.add_entry(LogEntry {
            timestamp: Utc::now(),
            level,
            stage: stage.map(str::to_string),
            message,
        });
    }

    fn info(&self, stage: Option<&str>, message: String) {
        self.record(LogLevel::Info, stage, message);
    }

    fn warning(&self, stage: Option<&str>, message: String) {
        self.record(LogLevel::Warning, stage, message);
    }

    fn error(&self, stage: Option<&str>, message: String) {
        self.record(LogLevel::Error, stage, message);
    }
}

/// Thread-safe in-memory event buffer
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for InMemoryEventLog {
    fn add_entry(&self, entry: LogEntry) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push(entry);
    }

    fn drain(&self) -> Vec<LogEntry> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.drain(..).collect()
    }
}
