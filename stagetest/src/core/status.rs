//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The result of running one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage ran and completed successfully.
    Ok,
    /// Stage was bypassed by a skip directive.
    Skip,
    /// Stage ran and returned an error or panicked.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status does not fail the test.
    ///
    /// A skipped stage counts as a success from the caller's perspective.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Returns true if the stage body actually executed.
    #[must_use]
    pub fn ran(&self) -> bool {
        !matches!(self, Self::Skip)
    }
}
