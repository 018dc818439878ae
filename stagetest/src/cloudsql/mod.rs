//! Staged integration test for the Cloud SQL MySQL example module.
//!
//! The test has five stages: `bootstrap`, `deploy`, `validate_outputs`,
//! `sql_tests` and a deferred `teardown`. Each one can be skipped with a
//! `SKIP_<STAGE>=true` directive, and every stage reloads its inputs from
//! the state store. A long-lived instance can therefore be deployed once
//! (`SKIP_TEARDOWN=true`) and then re-validated by later invocations
//! (`SKIP_BOOTSTRAP=true SKIP_DEPLOY=true`).

mod stages;

#[cfg(test)]
mod scenario_tests;

pub use stages::{
    bootstrap, deploy, module_dir, mysql_terraform_options, sql_tests, teardown,
    validate_outputs, BootstrapValues, AUTO_INCREMENT_STEP, CREATE_TABLE, DB_NAME, DB_PASS,
    DB_USER, EMPTY_TABLE, EXAMPLES_DIR, INSERT_ROW, KEY_INSTANCE_NAME, KEY_PROJECT_ID,
    KEY_REGION, MODULE_DIR, STAGE_BOOTSTRAP, STAGE_DEPLOY, STAGE_SQL_TESTS, STAGE_TEARDOWN,
    STAGE_VALIDATE_OUTPUTS, TEST_ROW_NAME,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bootstrap::{project_id_from_env, random_region, unique_id};
use crate::config::StagetestConfig;
use crate::core::TestSummary;
use crate::errors::{ConfigError, StagetestError};
use crate::events::{EventSink, LoggingEventSink};
use crate::provisioning::Provisioner;
use crate::resource::SqlConnector;
use crate::runner::StagedTest;
use crate::skip::{DirectiveSource, EnvDirectives, SkipPolicy};
use crate::state::StateStore;
use crate::workspace::prepare_test_folder;

/// Name the test reports under.
pub const TEST_NAME: &str = "cloud_sql_mysql";

/// Where the bootstrap stage gets its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapSource {
    /// Random id and region, project from the environment.
    Discover,
    /// Fixed values, for deterministic runs.
    Fixed(BootstrapValues),
}

/// The Cloud SQL MySQL staged test.
pub struct CloudSqlMySqlTest {
    provisioner: Arc<dyn Provisioner>,
    connector: Arc<dyn SqlConnector>,
    config: StagetestConfig,
    bootstrap: BootstrapSource,
    environment: Arc<dyn DirectiveSource>,
}

impl std::fmt::Debug for CloudSqlMySqlTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSqlMySqlTest")
            .field("bootstrap", &self.bootstrap)
            .field("regions", &self.config.cloudsql.regions)
            .finish_non_exhaustive()
    }
}

impl CloudSqlMySqlTest {
    /// Creates the test over the given collaborators.
    #[must_use]
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        connector: Arc<dyn SqlConnector>,
        config: StagetestConfig,
    ) -> Self {
        Self {
            provisioner,
            connector,
            config,
            bootstrap: BootstrapSource::Discover,
            environment: Arc::new(EnvDirectives),
        }
    }

    /// Uses fixed bootstrap values instead of discovering them.
    #[must_use]
    pub fn with_bootstrap(mut self, values: BootstrapValues) -> Self {
        self.bootstrap = BootstrapSource::Fixed(values);
        self
    }

    /// Reads the project id from `environment` instead of the process.
    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn DirectiveSource>) -> Self {
        self.environment = environment;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &StagetestConfig {
        &self.config
    }

    /// Resolves the values the bootstrap stage persists.
    pub fn resolve_bootstrap(&self) -> Result<BootstrapValues, StagetestError> {
        match &self.bootstrap {
            BootstrapSource::Fixed(values) => Ok(values.clone()),
            BootstrapSource::Discover => {
                let project_id = project_id_from_env(self.environment.as_ref())?;
                let region = random_region(&self.config.cloudsql.regions).ok_or_else(|| {
                    ConfigError::Invalid {
                        field: "cloudsql.regions".to_string(),
                        reason: "no candidate regions".to_string(),
                    }
                })?;
                Ok(BootstrapValues::new(
                    BootstrapValues::instance_name_for(&unique_id()),
                    region,
                    project_id,
                ))
            }
        }
    }

    async fn bootstrap_stage(&self, store: &StateStore) -> anyhow::Result<()> {
        let values = self.resolve_bootstrap()?;
        bootstrap(store, &values).await
    }

    /// Prepares the folder a run works in and returns its root.
    ///
    /// The examples folder of `repo_root` is copied unless a skip directive
    /// is set; the returned root contains `examples/cloud-sql-mysql`.
    pub fn prepare_root(repo_root: &Path, policy: &SkipPolicy) -> Result<PathBuf, StagetestError> {
        let examples = prepare_test_folder(repo_root, EXAMPLES_DIR, policy)?;
        Ok(examples
            .parent()
            .map_or_else(|| repo_root.to_path_buf(), Path::to_path_buf))
    }

    /// A staged test whose state lives in the module folder under `root_dir`.
    #[must_use]
    pub fn staged_test(
        &self,
        root_dir: &Path,
        policy: SkipPolicy,
        sink: Arc<dyn EventSink>,
    ) -> StagedTest {
        let store = StateStore::with_config(module_dir(root_dir), &self.config.state);
        StagedTest::with_parts(TEST_NAME, store, policy, sink)
    }

    /// Runs every stage against the module under `root_dir`.
    ///
    /// Teardown is registered before any other stage runs and executes
    /// after all of them, whatever they did.
    pub async fn run(&self, test: StagedTest, root_dir: &Path) -> TestSummary {
        test.run(|runner, store| async move {
            let provisioner = self.provisioner.clone();
            let teardown_store = store.clone();
            runner.defer_stage(STAGE_TEARDOWN, move || teardown(provisioner, teardown_store));

            runner
                .run_stage(STAGE_BOOTSTRAP, || self.bootstrap_stage(&store))
                .await;

            runner
                .run_stage(STAGE_DEPLOY, || {
                    deploy(self.provisioner.as_ref(), &store, root_dir, &self.config)
                })
                .await;

            runner
                .run_stage(STAGE_VALIDATE_OUTPUTS, || {
                    validate_outputs(self.provisioner.as_ref(), &store)
                })
                .await;

            runner
                .run_stage(STAGE_SQL_TESTS, || {
                    sql_tests(self.provisioner.as_ref(), self.connector.as_ref(), &store)
                })
                .await;
        })
        .await
    }

    /// Runs the test from a repository checkout, reading skip directives
    /// from the process environment.
    pub async fn run_from_env(&self, repo_root: &Path) -> Result<TestSummary, StagetestError> {
        let policy = SkipPolicy::from_env(self.config.skip.clone());
        let root_dir = Self::prepare_root(repo_root, &policy)?;
        let test = self.staged_test(&root_dir, policy, Arc::new(LoggingEventSink::default()));
        Ok(self.run(test, &root_dir).await)
    }
}
