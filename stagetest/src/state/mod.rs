//! Durable key/value state scoped to a test directory.
//!
//! Stages persist what later stages (or later invocations against the same
//! directory) need: generated names, chosen regions, the provisioning
//! options. Each key is one JSON file under `<test_dir>/.test-data/`.

mod store;

pub use store::{StateStore, TERRAFORM_OPTIONS_KEY};
