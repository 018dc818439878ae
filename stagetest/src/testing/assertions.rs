//! Assertions over test summaries and persisted state.

use crate::core::{StageStatus, TestSummary};
use crate::state::StateStore;

/// Asserts that `stage` was reported with `expected`.
pub fn assert_stage_status(summary: &TestSummary, stage: &str, expected: StageStatus) {
    let actual = summary.status_of(stage);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{}' to be {:?}, got {:?}. Stages: {:?}",
        stage,
        expected,
        actual,
        summary.stages.iter().map(|s| &s.name).collect::<Vec<_>>()
    );
}

/// Asserts that `stage` ran and succeeded.
pub fn assert_stage_ok(summary: &TestSummary, stage: &str) {
    assert_stage_status(summary, stage, StageStatus::Ok);
}

/// Asserts that `stage` was bypassed.
pub fn assert_stage_skipped(summary: &TestSummary, stage: &str) {
    assert_stage_status(summary, stage, StageStatus::Skip);
}

/// Asserts that `stage` failed and its error mentions `needle`.
pub fn assert_stage_failed_with(summary: &TestSummary, stage: &str, needle: &str) {
    assert_stage_status(summary, stage, StageStatus::Fail);
    let error = summary
        .stage(stage)
        .and_then(|s| s.error.clone())
        .unwrap_or_default();
    assert!(
        error.contains(needle),
        "Expected stage '{stage}' error to contain '{needle}', got: {error}"
    );
}

/// Asserts that stages were reported in exactly this order.
pub fn assert_stage_order(summary: &TestSummary, expected: &[&str]) {
    let actual: Vec<&str> = summary.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(actual, expected, "Unexpected stage order");
}

/// Asserts that the store holds exactly `expected` keys.
pub fn assert_state_keys(store: &StateStore, expected: &[&str]) {
    let keys = store.keys().unwrap_or_default();
    let mut expected: Vec<String> = expected.iter().map(|k| (*k).to_string()).collect();
    expected.sort();
    assert_eq!(
        keys,
        expected,
        "Unexpected keys in {}",
        store.data_dir().display()
    );
}
