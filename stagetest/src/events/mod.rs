//! Stage lifecycle events.
//!
//! The runner publishes one event per lifecycle transition (entered,
//! skipped, completed, failed) to the `EventSink` it was built with. Sinks
//! are passed in explicitly; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::StageStatus;
use serde::{Deserialize, Serialize};

/// A lifecycle transition of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageEventKind {
    /// The runner entered the stage.
    Entered,
    /// A skip directive bypassed the stage.
    Skipped,
    /// The stage body completed successfully.
    Completed,
    /// The stage body returned an error or panicked.
    Failed,
}

impl StageEventKind {
    /// Dotted event type, e.g. `stage.completed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Entered => "stage.entered",
            Self::Skipped => "stage.skipped",
            Self::Completed => "stage.completed",
            Self::Failed => "stage.failed",
        }
    }

    /// Maps a final stage status to the event that announces it.
    #[must_use]
    pub fn for_status(status: StageStatus) -> Self {
        match status {
            StageStatus::Ok => Self::Completed,
            StageStatus::Skip => Self::Skipped,
            StageStatus::Fail => Self::Failed,
        }
    }
}

/// Event emitted by the stage runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Which transition happened.
    pub kind: StageEventKind,
    /// Test name.
    pub test: String,
    /// Stage name.
    pub stage: String,
    /// Whether the stage is deferred cleanup.
    #[serde(default)]
    pub deferred: bool,
    /// Extra detail (skip directive or error message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(kind: StageEventKind, test: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            kind,
            test: test.into(),
            stage: stage.into(),
            deferred: false,
            detail: None,
        }
    }

    /// Marks the event as belonging to a deferred stage.
    #[must_use]
    pub fn with_deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Converts the event to a JSON payload.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
