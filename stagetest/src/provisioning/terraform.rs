//! Provisioner backed by the `terraform` command line.

use super::{Outputs, Provisioner, TerraformOptions};
use crate::config::TerraformConfig;
use crate::errors::ProvisioningError;
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs `terraform init/apply/output/destroy` as subprocesses.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::from_config(&TerraformConfig::default())
    }
}

impl TerraformCli {
    /// Creates an adapter using the given executable.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Creates an adapter from configuration.
    #[must_use]
    pub fn from_config(config: &TerraformConfig) -> Self {
        Self::new(config.binary.clone())
    }

    /// Builds the argument list for a terraform subcommand.
    #[must_use]
    pub fn command_args(&self, subcommand: &str, options: &TerraformOptions) -> Vec<String> {
        let mut args = vec![subcommand.to_string()];
        match subcommand {
            "init" => {
                args.push("-upgrade=false".to_string());
                args.push("-input=false".to_string());
            }
            "apply" | "destroy" => {
                args.push("-input=false".to_string());
                args.push("-auto-approve".to_string());
                args.push("-lock=false".to_string());
                args.extend(options.var_args());
            }
            "output" => args.push("-json".to_string()),
            _ => {}
        }
        if options.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    /// Runs a subcommand, retrying while its output matches a retryable error.
    async fn run(
        &self,
        subcommand: &str,
        options: &TerraformOptions,
    ) -> Result<String, ProvisioningError> {
        let retryable = compile_retryable(options)?;
        let args = self.command_args(subcommand, options);
        let command_line = format!("{} {}", self.binary, args.join(" "));

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(command = %command_line, dir = %options.terraform_dir.display(), attempt, "running terraform");

            let output = Command::new(&self.binary)
                .args(&args)
                .current_dir(&options.terraform_dir)
                .envs(&options.env_vars)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| ProvisioningError::Spawn {
                    command: command_line.clone(),
                    source,
                })?;

            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            if output.status.success() {
                return Ok(stdout);
            }

            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let combined = format!("{stdout}\n{stderr}");
            match matching_description(&retryable, &combined) {
                Some(description) if attempt <= options.max_retries => {
                    warn!(
                        command = %command_line,
                        attempt,
                        max_retries = options.max_retries,
                        reason = description,
                        "retryable terraform error, sleeping before retry"
                    );
                    tokio::time::sleep(options.time_between_retries()).await;
                }
                _ => {
                    return Err(ProvisioningError::CommandFailed {
                        command: command_line,
                        status: output.status.to_string(),
                        stderr: stderr.trim().to_string(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn init_and_apply(
        &self,
        options: &TerraformOptions,
    ) -> Result<Outputs, ProvisioningError> {
        self.run("init", options).await?;
        self.run("apply", options).await?;
        self.outputs(options).await
    }

    async fn destroy(&self, options: &TerraformOptions) -> Result<(), ProvisioningError> {
        self.run("destroy", options).await.map(|_| ())
    }

    async fn outputs(&self, options: &TerraformOptions) -> Result<Outputs, ProvisioningError> {
        let stdout = self.run("output", options).await?;
        Outputs::from_terraform_json(&stdout)
    }
}

fn compile_retryable(
    options: &TerraformOptions,
) -> Result<Vec<(Regex, String)>, ProvisioningError> {
    options
        .retryable_errors
        .iter()
        .map(|(pattern, description)| {
            Regex::new(pattern)
                .map(|re| (re, description.clone()))
                .map_err(|e| ProvisioningError::InvalidRetryPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

fn matching_description<'a>(retryable: &'a [(Regex, String)], output: &str) -> Option<&'a str> {
    retryable
        .iter()
        .find(|(re, _)| re.is_match(output))
        .map(|(_, description)| description.as_str())
}
