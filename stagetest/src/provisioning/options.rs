//! Provisioning parameter set.

use crate::config::TerraformConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to apply or destroy one module.
///
/// Persisted by the deploy stage so teardown can reload it in a later
/// process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerraformOptions {
    /// Directory containing the module's configuration.
    pub terraform_dir: PathBuf,
    /// Input variables passed as `-var name=value`.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Extra environment for the terraform process.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Regex over command output → description of a transient error.
    #[serde(default)]
    pub retryable_errors: BTreeMap<String, String>,
    /// Retries after a retryable failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Sleep between retries in seconds.
    #[serde(default)]
    pub time_between_retries_secs: u64,
    /// Pass `-no-color` to every command.
    #[serde(default = "default_no_color")]
    pub no_color: bool,
}

fn default_no_color() -> bool {
    true
}

impl TerraformOptions {
    /// Creates options for a module directory with no variables.
    #[must_use]
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            retryable_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries_secs: 0,
            no_color: default_no_color(),
        }
    }

    /// Copies retry settings from the adapter configuration.
    #[must_use]
    pub fn with_retry_config(mut self, config: &TerraformConfig) -> Self {
        self.retryable_errors
            .extend(config.retryable_errors.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.max_retries = config.max_retries;
        self.time_between_retries_secs = config.time_between_retries_secs;
        self
    }

    /// Sets an input variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Sets an environment variable for the terraform process.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    /// Marks output matching `pattern` as a transient error.
    #[must_use]
    pub fn with_retryable_error(
        mut self,
        pattern: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.retryable_errors.insert(pattern.into(), description.into());
        self
    }

    /// Returns a string variable, if set to a string.
    #[must_use]
    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(serde_json::Value::as_str)
    }

    /// Gets the retry sleep as Duration.
    #[must_use]
    pub fn time_between_retries(&self) -> Duration {
        Duration::from_secs(self.time_between_retries_secs)
    }

    /// Renders the variables as `-var name=value` arguments.
    ///
    /// Strings are passed verbatim; every other value is rendered as JSON,
    /// which terraform accepts as an HCL literal.
    #[must_use]
    pub fn var_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.vars.len() * 2);
        for (name, value) in &self.vars {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            args.push("-var".to_string());
            args.push(format!("{name}={rendered}"));
        }
        args
    }
}
