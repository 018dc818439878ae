//! Event sink trait and implementations.

use super::{StageEvent, StageEventKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Trait for sinks that receive stage events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &StageEvent);

    /// Emits an event without awaiting.
    ///
    /// Must never panic; delivery problems are logged and dropped.
    fn try_emit(&self, event: &StageEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StageEvent) {}

    fn try_emit(&self, _event: &StageEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log_event(&self, event: &StageEvent) {
        let event_type = event.kind.event_type();
        if self.level == Level::INFO {
            info!(
                event_type,
                test = %event.test,
                stage = %event.stage,
                deferred = event.deferred,
                detail = ?event.detail,
                "Event: {}", event_type
            );
        } else {
            debug!(
                event_type,
                test = %event.test,
                stage = %event.stage,
                deferred = event.deferred,
                detail = ?event.detail,
                "Event: {}", event_type
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StageEvent) {
        self.log_event(event);
    }
}

/// A sink that keeps every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StageEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns `(stage, kind)` pairs in emission order.
    #[must_use]
    pub fn transitions(&self) -> Vec<(String, StageEventKind)> {
        self.events
            .read()
            .iter()
            .map(|e| (e.stage.clone(), e.kind))
            .collect()
    }

    /// Returns the events for one stage.
    #[must_use]
    pub fn events_for(&self, stage: &str) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: StageEventKind, stage: &str) -> StageEvent {
        StageEvent::new(kind, "t", stage)
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(&event(StageEventKind::Entered, "deploy")).await;
        let sink = LoggingEventSink::new(Level::INFO);
        sink.emit(&event(StageEventKind::Completed, "deploy")).await;
        sink.try_emit(&event(StageEventKind::Failed, "deploy").with_detail("boom"));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&event(StageEventKind::Entered, "deploy")).await;
        sink.try_emit(&event(StageEventKind::Skipped, "deploy"));
        sink.emit(&event(StageEventKind::Entered, "teardown")).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_for("deploy").len(), 2);
        assert_eq!(
            sink.transitions()[1],
            ("deploy".to_string(), StageEventKind::Skipped)
        );
    }
}
