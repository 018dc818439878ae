//! Stage reports and test summaries.

use super::StageStatus;
use crate::errors::StagetestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one stage in one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Stage status.
    pub status: StageStatus,
    /// When the stage was entered.
    pub started_at: DateTime<Utc>,
    /// When the stage returned.
    pub ended_at: DateTime<Utc>,
    /// Error message if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The skip directive that bypassed the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_directive: Option<String>,
    /// Whether the stage was registered as deferred cleanup.
    #[serde(default)]
    pub deferred: bool,
}

impl StageReport {
    /// Creates a completed stage report.
    #[must_use]
    pub fn completed(name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Ok,
            started_at,
            ended_at: Utc::now(),
            error: None,
            skip_directive: None,
            deferred: false,
        }
    }

    /// Creates a failed stage report.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Fail,
            started_at,
            ended_at: Utc::now(),
            error: Some(error.into()),
            skip_directive: None,
            deferred: false,
        }
    }

    /// Creates a skipped stage report.
    #[must_use]
    pub fn skipped(name: impl Into<String>, directive: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            status: StageStatus::Skip,
            started_at: now,
            ended_at: now,
            error: None,
            skip_directive: Some(directive.into()),
            deferred: false,
        }
    }

    /// Marks the report as belonging to a deferred stage.
    #[must_use]
    pub fn as_deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// The ordered stage reports of one test invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Test name.
    pub test_name: String,
    /// Reports in execution order.
    pub stages: Vec<StageReport>,
}

impl TestSummary {
    /// Creates a summary from reports.
    #[must_use]
    pub fn new(test_name: impl Into<String>, stages: Vec<StageReport>) -> Self {
        Self {
            test_name: test_name.into(),
            stages,
        }
    }

    /// Returns true if no non-skipped stage failed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.stages.iter().all(|s| s.status.is_success())
    }

    /// Names of the failed stages, in execution order.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.status.is_failure())
            .map(|s| s.name.clone())
            .collect()
    }

    /// Returns the report of the named stage, if it was entered.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the status of the named stage, if it was entered.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    /// Converts the summary into a `Result`.
    pub fn into_result(self) -> Result<Self, StagetestError> {
        let failed = self.failed_stages();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(StagetestError::StagesFailed { failed })
        }
    }

    /// Panics with every failure message if any stage failed.
    ///
    /// Intended as the last line of a `#[test]` so the test binary exits
    /// non-zero.
    pub fn assert_passed(&self) {
        if self.passed() {
            return;
        }
        let details: Vec<String> = self
            .stages
            .iter()
            .filter(|s| s.status.is_failure())
            .map(|s| format!("{}: {}", s.name, s.error.as_deref().unwrap_or("<no message>")))
            .collect();
        panic!("test '{}' failed:\n  {}", self.test_name, details.join("\n  "));
    }
}
