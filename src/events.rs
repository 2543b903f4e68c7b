//! Observer hooks fired by the engine.
//!
//! Provides the [`EventSink`] trait, the events it receives and two stock sinks: the default
//! no-op sink and a bounded in-memory sink for tests and diagnostics.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Raised before the engine waits and retries a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRequestEvent {
    /// Display form of the failure that triggered the retry
    pub error: String,
    pub url: String,
    /// Retries still available, counting the one about to happen
    pub retries_remaining: u32,
    /// Correlation id of the logical call
    pub request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Request,
    Response,
}

/// Verbose log line forwarded to the sink when the matching [`crate::LogLevel`] is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub kind: LogKind,
    pub message: String,
}

/// Receives engine events. Called synchronously on the calling thread or task.
pub trait EventSink: Send + Sync {
    fn on_retry(&self, _event: &RetryRequestEvent) {}

    fn on_log(&self, _event: &LogEvent) {}
}

/// Default sink (no collection).
pub struct NoopEventSink;

impl EventSink for NoopEventSink {}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoopEventSink)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Retry(RetryRequestEvent),
    Log(LogEvent),
}

/// In-memory sink; keeps the last `max_events` events.
pub struct InMemoryEventSink {
    events: RwLock<Vec<RecordedEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn retries(&self) -> Vec<RetryRequestEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Retry(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Log(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, event: RecordedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
            if events.len() > self.max_events {
                events.remove(0);
            }
        }
    }
}

impl EventSink for InMemoryEventSink {
    fn on_retry(&self, event: &RetryRequestEvent) {
        self.push(RecordedEvent::Retry(event.clone()));
    }

    fn on_log(&self, event: &LogEvent) {
        self.push(RecordedEvent::Log(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry(n: u32) -> RetryRequestEvent {
        RetryRequestEvent {
            error: "boom".into(),
            url: "https://prtg.example.com/api/table.xml".into(),
            retries_remaining: n,
            request_id: "r1".into(),
        }
    }

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        sink.on_retry(&retry(3));
        sink.on_retry(&retry(2));
        sink.on_log(&LogEvent {
            kind: LogKind::Response,
            message: "<xml/>".into(),
        });

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.retries(), vec![retry(2)]);
        assert_eq!(sink.logs().len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
