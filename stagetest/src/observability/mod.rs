//! Logging setup for staged test binaries.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! caller's choice. Test binaries usually call [`init_tracing`] at the top
//! of each test, which is safe to repeat.

use crate::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber honouring `RUST_LOG`.
///
/// Falls back to `config.level` when `RUST_LOG` is unset or invalid.
/// Returns false if a subscriber was already installed.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer();

    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
