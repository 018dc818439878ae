//! Configuration for staged test runs.
//!
//! [`StagetestConfig`] gathers the knobs shared by every staged test:
//! skip-directive naming, the state-store layout, logging, the Terraform
//! adapter and the Cloud SQL scenario.
//!
//! Loading order:
//! 1. `Default` implementations
//! 2. TOML file (`stagetest.toml`)
//! 3. Environment overrides (`STAGETEST_<SECTION>_<FIELD>`)
//!
//! ```no_run
//! # fn example() -> Result<(), stagetest::errors::ConfigError> {
//! use stagetest::config::StagetestConfig;
//!
//! let config = StagetestConfig::load("stagetest.toml")?;
//! let config = StagetestConfig::parse("[skip]\nprefix = \"SKIP_\"")?;
//! # Ok(())
//! # }
//! ```

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagetestConfig {
    /// Skip directive settings.
    #[serde(default)]
    pub skip: SkipConfig,
    /// State store settings.
    #[serde(default)]
    pub state: StateConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Terraform adapter settings.
    #[serde(default)]
    pub terraform: TerraformConfig,
    /// Cloud SQL scenario settings.
    #[serde(default)]
    pub cloudsql: CloudSqlConfig,
}

impl StagetestConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from defaults and environment overrides only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies `STAGETEST_<SECTION>_<FIELD>` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.skip.prefix, "STAGETEST_SKIP_PREFIX");
        override_string(&mut self.skip.value, "STAGETEST_SKIP_VALUE");

        override_string(&mut self.state.data_dir_name, "STAGETEST_STATE_DATA_DIR_NAME");

        override_string(&mut self.log.level, "STAGETEST_LOG_LEVEL");
        override_bool(&mut self.log.json, "STAGETEST_LOG_JSON");

        override_string(&mut self.terraform.binary, "STAGETEST_TERRAFORM_BINARY");
        override_u32(&mut self.terraform.max_retries, "STAGETEST_TERRAFORM_MAX_RETRIES");
        override_u64(
            &mut self.terraform.time_between_retries_secs,
            "STAGETEST_TERRAFORM_TIME_BETWEEN_RETRIES_SECS",
        );

        override_list(&mut self.cloudsql.regions, "STAGETEST_CLOUDSQL_REGIONS");
        override_string(&mut self.cloudsql.mysql_version, "STAGETEST_CLOUDSQL_MYSQL_VERSION");
    }

    /// Rejects values the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.skip.prefix.is_empty() {
            return Err(invalid("skip.prefix", "must not be empty"));
        }
        if self.skip.value.trim().is_empty() {
            return Err(invalid("skip.value", "must not be empty"));
        }
        let dir = &self.state.data_dir_name;
        if dir.is_empty() || dir.contains(['/', '\\']) || dir == "." || dir == ".." {
            return Err(invalid(
                "state.data_dir_name",
                "must be a single non-empty path component",
            ));
        }
        if self.terraform.binary.is_empty() {
            return Err(invalid("terraform.binary", "must not be empty"));
        }
        for pattern in self.terraform.retryable_errors.keys() {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(invalid("terraform.retryable_errors", e.to_string()));
            }
        }
        if self.cloudsql.regions.is_empty() {
            return Err(invalid("cloudsql.regions", "at least one region is required"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Skip directive naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipConfig {
    /// Prefix prepended to the stage name.
    #[serde(default = "default_skip_prefix")]
    pub prefix: String,
    /// Value that means "skip"; a directive must equal it exactly.
    #[serde(default = "default_skip_value")]
    pub value: String,
}

fn default_skip_prefix() -> String {
    "SKIP_".to_string()
}

fn default_skip_value() -> String {
    "true".to_string()
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            prefix: default_skip_prefix(),
            value: default_skip_value(),
        }
    }
}

/// State store layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory created inside the test directory to hold entries.
    #[serde(default = "default_data_dir_name")]
    pub data_dir_name: String,
}

fn default_data_dir_name() -> String {
    ".test-data".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir_name: default_data_dir_name(),
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Terraform adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformConfig {
    /// Terraform executable name or path.
    #[serde(default = "default_terraform_binary")]
    pub binary: String,
    /// Retries after a retryable failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sleep between retries in seconds.
    #[serde(default = "default_time_between_retries")]
    pub time_between_retries_secs: u64,
    /// Regex over command output → human description.
    #[serde(default)]
    pub retryable_errors: BTreeMap<String, String>,
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_time_between_retries() -> u64 {
    5
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: default_terraform_binary(),
            max_retries: default_max_retries(),
            time_between_retries_secs: default_time_between_retries(),
            retryable_errors: BTreeMap::new(),
        }
    }
}

impl TerraformConfig {
    /// Gets the retry sleep as Duration.
    #[must_use]
    pub fn time_between_retries(&self) -> Duration {
        Duration::from_secs(self.time_between_retries_secs)
    }
}

/// Cloud SQL scenario settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSqlConfig {
    /// Regions the bootstrap stage picks from.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// Database engine version passed to the module.
    #[serde(default = "default_mysql_version")]
    pub mysql_version: String,
}

fn default_regions() -> Vec<String> {
    [
        "us-central1",
        "us-east1",
        "us-west1",
        "europe-west1",
        "europe-west2",
        "asia-east1",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_mysql_version() -> String {
    "MYSQL_5_7".to_string()
}

impl Default for CloudSqlConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            mysql_version: default_mysql_version(),
        }
    }
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => *target = true,
            "false" | "0" | "no" => *target = false,
            other => warn!(var, value = other, "ignoring non-boolean override"),
        }
    }
}

fn override_u32(target: &mut u32, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(e) => warn!(var, %value, error = %e, "ignoring non-numeric override"),
        }
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(e) => warn!(var, %value, error = %e, "ignoring non-numeric override"),
        }
    }
}

fn override_list(target: &mut Vec<String>, var: &str) {
    if let Ok(value) = std::env::var(var) {
        let items: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if !items.is_empty() {
            *target = items;
        }
    }
}
