//! Job event log and sink implementations.
//!
//! Event lines are an observability hook, formatted as
//! `<jobID>:<workerName|null>:<riderName|null>: <message>`.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Job, JobId};
use crate::util::clock::now_ms;

/// A single job event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    /// Job the event belongs to.
    pub job_id: JobId,
    /// Assigned worker, if any.
    pub worker: Option<String>,
    /// Rider being transported, if known.
    pub rider: Option<String>,
    /// Free-form message.
    pub message: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.job_id,
            self.worker.as_deref().unwrap_or("null"),
            self.rider.as_deref().unwrap_or("null"),
            self.message
        )
    }
}

/// Helper to build an event from its parts.
pub fn build_job_event(
    job_id: JobId,
    worker: Option<&str>,
    rider: Option<&str>,
    message: impl Into<String>,
) -> JobEvent {
    JobEvent {
        job_id,
        worker: worker.map(str::to_owned),
        rider: rider.map(str::to_owned),
        message: message.into(),
        created_at_ms: now_ms(),
    }
}

/// Event sink abstraction.
pub trait EventSink: Send {
    /// Record an event.
    fn record(&mut self, event: JobEvent);
}

/// Writes each event as one line on standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutEventSink;

impl EventSink for StdoutEventSink {
    fn record(&mut self, event: JobEvent) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{event}");
    }
}

/// In-memory sink for testing and dev.
///
/// Clones share the same buffer, so a test can keep one clone and hand the
/// other to the dispatcher.
#[derive(Debug, Clone)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<VecDeque<JobEvent>>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Snapshot of stored events rendered as log lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.events.lock().iter().map(ToString::to_string).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&mut self, event: JobEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Gate in front of a sink: records only when event logging is enabled.
pub(crate) struct EventLog {
    enabled: bool,
    sink: Mutex<Box<dyn EventSink>>,
}

impl EventLog {
    pub(crate) fn new(enabled: bool, sink: Box<dyn EventSink>) -> Self {
        Self {
            enabled,
            sink: Mutex::new(sink),
        }
    }

    pub(crate) const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn log_event(&self, job: &Job, message: &str) {
        tracing::debug!(job = %job, "{message}");
        if !self.enabled {
            return;
        }
        let event = build_job_event(job.id(), job.worker_name(), Some(job.rider().name()), message);
        self.sink.lock().record(event);
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_line_format() {
        let event = build_job_event(3, Some("Barbara"), Some("Alex"), "picked up");
        assert_eq!(event.to_string(), "3:Barbara:Alex: picked up");

        let event = build_job_event(4, None, None, "queued");
        assert_eq!(event.to_string(), "4:null:null: queued");
    }

    #[test]
    fn test_in_memory_sink_overflow() {
        let sink = InMemoryEventSink::new(2);
        let mut writer = sink.clone();
        writer.record(build_job_event(1, None, Some("a"), "one"));
        writer.record(build_job_event(2, None, Some("b"), "two"));
        writer.record(build_job_event(3, None, Some("c"), "three"));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].job_id, 2);
        assert_eq!(events[1].job_id, 3);
        assert!(events[0].created_at_ms > 0);
    }

    #[test]
    fn test_zero_capacity_sink_keeps_nothing() {
        let sink = InMemoryEventSink::new(0);
        let mut writer = sink.clone();
        writer.record(build_job_event(1, None, Some("a"), "one"));
        writer.record(build_job_event(2, None, Some("b"), "two"));
        assert!(sink.events().is_empty());
    }
}
