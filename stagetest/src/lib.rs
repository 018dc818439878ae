//! # Stagetest
//!
//! Staged integration tests for infrastructure modules.
//!
//! A staged test splits a long, expensive integration test into named
//! stages (bootstrap, deploy, validate, exercise, teardown) that:
//!
//! - **Skip on demand**: `SKIP_<STAGE>=true` bypasses a stage
//! - **Resume across invocations**: stages hand values to each other through
//!   a durable per-directory state store, not through memory
//! - **Always clean up**: deferred stages run after the body even when a
//!   stage fails or panics
//! - **Report structurally**: every transition is logged with `tracing` and
//!   published to an [`events::EventSink`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagetest::prelude::*;
//!
//! let config = StagetestConfig::from_env()?;
//! observability::init_tracing(&config.log);
//!
//! let test = CloudSqlMySqlTest::new(
//!     Arc::new(TerraformCli::from_config(&config.terraform)),
//!     Arc::new(my_mysql_driver),
//!     config,
//! );
//! test.run_from_env(Path::new("..")).await?.assert_passed();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bootstrap;
pub mod cloudsql;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod provisioning;
pub mod resource;
pub mod runner;
pub mod skip;
pub mod state;
pub mod testing;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cloudsql::{BootstrapValues, CloudSqlMySqlTest};
    pub use crate::config::StagetestConfig;
    pub use crate::core::{StageReport, StageStatus, TestSummary};
    pub use crate::errors::{
        AssertionFailure, Checks, ConnectionError, ProvisioningError, StateError,
        StagetestError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability;
    pub use crate::provisioning::{Outputs, Provisioner, TerraformCli, TerraformOptions};
    pub use crate::resource::{ConnectionDescriptor, ExecResult, SqlConnection, SqlConnector};
    pub use crate::runner::{StageRunner, StagedTest};
    pub use crate::skip::{DirectiveSource, SkipPolicy};
    pub use crate::state::StateStore;
    pub use crate::workspace::prepare_test_folder;
    pub use std::path::Path;
    pub use std::sync::Arc;
}
