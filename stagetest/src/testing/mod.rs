//! Testing utilities for staged tests.
//!
//! This module provides:
//! - In-memory provisioner and SQL server fakes
//! - Assertions over stage reports and persisted state
//! - A fixture that wires a staged test without the process environment

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_stage_failed_with, assert_stage_ok, assert_stage_order, assert_stage_skipped,
    assert_stage_status, assert_state_keys,
};
pub use fixtures::{skip_policy, TestFixture};
pub use mocks::{FakeProvisioner, FakeSqlConnection, FakeSqlServer, ProvisionerCall};
