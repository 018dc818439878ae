//! Core domain model types for stagetest.
//!
//! This module contains the fundamental types shared by the runner and
//! its callers:
//! - Stage status enum
//! - Per-stage reports and the whole-test summary

mod report;
mod status;

pub use report::{StageReport, TestSummary};
pub use status::StageStatus;
