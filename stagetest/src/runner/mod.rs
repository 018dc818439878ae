//! Stage runner and staged test composition.
//!
//! [`StageRunner::run_stage`] is the central primitive: it consults the skip
//! policy, runs the stage body, and turns errors and panics into a failed
//! [`StageReport`](crate::core::StageReport) instead of unwinding.
//! [`StageRunner::defer_stage`] registers cleanup stages that
//! [`StagedTest::run`] executes after the body, whatever happened in it.

mod deferred;
mod stage_runner;

pub use deferred::StageFuture;
pub use stage_runner::StageRunner;
pub use staged_test::{StagedTest, BODY_STAGE};
