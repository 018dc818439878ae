//! The five stage bodies of the Cloud SQL MySQL test.
//!
//! Every stage reloads what it needs from the state store instead of
//! receiving it from the previous stage, so any prefix of stages can be
//! skipped when a later invocation resumes an earlier one.

use anyhow::Context;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::StagetestConfig;
use crate::errors::{AssertionFailure, Checks};
use crate::provisioning::{Provisioner, TerraformOptions};
use crate::resource::{ConnectionDescriptor, SqlConnection, SqlConnector};
use crate::state::StateStore;

/// Chooses and persists names.
pub const STAGE_BOOTSTRAP: &str = "bootstrap";
/// Applies the module.
pub const STAGE_DEPLOY: &str = "deploy";
/// Checks the module outputs.
pub const STAGE_VALIDATE_OUTPUTS: &str = "validate_outputs";
/// Exercises the database.
pub const STAGE_SQL_TESTS: &str = "sql_tests";
/// Destroys the module; deferred, runs last.
pub const STAGE_TEARDOWN: &str = "teardown";

/// State key holding the instance name.
pub const KEY_INSTANCE_NAME: &str = "instance-name";
/// State key holding the region.
pub const KEY_REGION: &str = "region";
/// State key holding the project id.
pub const KEY_PROJECT_ID: &str = "project-id";

/// Database created by the module.
pub const DB_NAME: &str = "testdb";
/// Master user created by the module.
pub const DB_USER: &str = "testuser";
/// Master password passed to the module.
pub const DB_PASS: &str = "testpassword";

/// Folder holding the example modules, relative to the repository root.
pub const EXAMPLES_DIR: &str = "examples";
/// The module under test, relative to [`EXAMPLES_DIR`].
pub const MODULE_DIR: &str = "cloud-sql-mysql";

/// Creates the probe table.
pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS test (id int NOT NULL AUTO_INCREMENT, name varchar(10) NOT NULL, PRIMARY KEY (ID))";
/// Empties the probe table.
pub const EMPTY_TABLE: &str = "DELETE FROM test";
/// Inserts one probe row.
pub const INSERT_ROW: &str = "INSERT INTO test(name) VALUES(?)";
/// Value inserted by [`INSERT_ROW`].
pub const TEST_ROW_NAME: &str = "Grunt";
/// `auto_increment_increment` the module configures on the instance.
pub const AUTO_INCREMENT_STEP: i64 = 5;

/// Values chosen by the bootstrap stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapValues {
    /// Cloud SQL instance name, `mysql-test-<id>`.
    pub instance_name: String,
    /// Region to deploy into.
    pub region: String,
    /// Project to deploy into.
    pub project_id: String,
}

impl BootstrapValues {
    /// Creates bootstrap values.
    #[must_use]
    pub fn new(
        instance_name: impl Into<String>,
        region: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            region: region.into(),
            project_id: project_id.into(),
        }
    }

    /// Instance name for a unique id.
    #[must_use]
    pub fn instance_name_for(id: &str) -> String {
        format!("mysql-test-{}", id.to_lowercase())
    }

    /// Reads the values persisted by an earlier bootstrap.
    pub fn load(store: &StateStore) -> anyhow::Result<Self> {
        Ok(Self {
            instance_name: store.load_string(KEY_INSTANCE_NAME)?,
            region: store.load_string(KEY_REGION)?,
            project_id: store.load_string(KEY_PROJECT_ID)?,
        })
    }

    /// The proxy connection name, `<project>:<region>:<instance>`.
    #[must_use]
    pub fn proxy_connection(&self) -> String {
        format!("{}:{}:{}", self.project_id, self.region, self.instance_name)
    }
}

/// Directory of the module under test below `root_dir`.
#[must_use]
pub fn module_dir(root_dir: &Path) -> PathBuf {
    root_dir.join(EXAMPLES_DIR).join(MODULE_DIR)
}

/// Terraform options for deploying the MySQL module.
#[must_use]
pub fn mysql_terraform_options(
    values: &BootstrapValues,
    root_dir: &Path,
    config: &StagetestConfig,
) -> TerraformOptions {
    TerraformOptions::new(module_dir(root_dir))
        .with_retry_config(&config.terraform)
        .with_var("region", values.region.as_str())
        .with_var("project", values.project_id.as_str())
        .with_var("name", values.instance_name.as_str())
        .with_var("mysql_version", config.cloudsql.mysql_version.as_str())
        .with_var("db_name", DB_NAME)
        .with_var("master_username", DB_USER)
        .with_var("master_password", DB_PASS)
}

/// Persists the bootstrap values.
pub async fn bootstrap(store: &StateStore, values: &BootstrapValues) -> anyhow::Result<()> {
    info!(
        instance = %values.instance_name,
        region = %values.region,
        project = %values.project_id,
        "bootstrapping"
    );
    store.save_string(KEY_INSTANCE_NAME, &values.instance_name)?;
    store.save_string(KEY_REGION, &values.region)?;
    store.save_string(KEY_PROJECT_ID, &values.project_id)?;
    Ok(())
}

/// Builds and persists the Terraform options, then applies the module.
pub async fn deploy(
    provisioner: &dyn Provisioner,
    store: &StateStore,
    root_dir: &Path,
    config: &StagetestConfig,
) -> anyhow::Result<()> {
    let values = BootstrapValues::load(store)?;
    let options = mysql_terraform_options(&values, root_dir, config);
    store.save_terraform_options(&options)?;

    info!(dir = %options.terraform_dir.display(), "applying module");
    provisioner
        .init_and_apply(&options)
        .await
        .context("terraform init/apply")?;
    Ok(())
}

/// Checks the module outputs against the bootstrap values.
pub async fn validate_outputs(provisioner: &dyn Provisioner, store: &StateStore) -> anyhow::Result<()> {
    let options = store.load_terraform_options()?;
    let values = BootstrapValues::load(store)?;
    let outputs = provisioner
        .outputs(&options)
        .await
        .context("terraform output")?;

    let instance_name = outputs.string("instance_name")?;
    let db_name = outputs.string("db_name")?;
    let proxy_connection = outputs.string("proxy_connection")?;

    let mut checks = Checks::new();
    checks
        .equal("instance_name", values.instance_name.as_str(), instance_name.as_str())
        .equal("db_name", DB_NAME, db_name.as_str())
        .equal(
            "proxy_connection",
            values.proxy_connection().as_str(),
            proxy_connection.as_str(),
        );
    checks.finish()?;
    Ok(())
}

/// Connects to the instance and checks the auto-increment setting.
///
/// The connection is closed on every path out of this function.
pub async fn sql_tests(
    provisioner: &dyn Provisioner,
    connector: &dyn SqlConnector,
    store: &StateStore,
) -> anyhow::Result<()> {
    let options = store.load_terraform_options()?;
    let public_ip = provisioner
        .outputs(&options)
        .await
        .context("terraform output")?
        .string("public_ip")?;

    let descriptor = ConnectionDescriptor::mysql(DB_USER, DB_PASS, public_ip, DB_NAME);
    info!(endpoint = %descriptor.target(), "connecting");
    let mut connection = connector.open(&descriptor).await?;

    let outcome = AssertUnwindSafe(probe_auto_increment(&mut *connection))
        .catch_unwind()
        .await;
    connection.close().await;
    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

async fn probe_auto_increment(connection: &mut dyn SqlConnection) -> anyhow::Result<()> {
    info!("ping");
    connection.ping().await?;

    info!(statement = CREATE_TABLE, "create table");
    connection.execute(CREATE_TABLE, &[]).await?;

    info!(statement = EMPTY_TABLE, "empty table");
    connection.execute(EMPTY_TABLE, &[]).await?;

    info!(statement = INSERT_ROW, "insert row");
    let inserted = connection
        .execute(INSERT_ROW, &[serde_json::Value::from(TEST_ROW_NAME)])
        .await?;

    let remainder = inserted.last_insert_id % AUTO_INCREMENT_STEP;
    if remainder != 0 {
        return Err(AssertionFailure::single(
            format!("last_insert_id % {AUTO_INCREMENT_STEP}"),
            "0",
            format!("{remainder} (id {})", inserted.last_insert_id),
        )
        .into());
    }
    Ok(())
}

/// Destroys whatever the persisted Terraform options describe.
pub async fn teardown(provisioner: Arc<dyn Provisioner>, store: StateStore) -> anyhow::Result<()> {
    let options = store.load_terraform_options()?;
    info!(dir = %options.terraform_dir.display(), "destroying module");
    provisioner
        .destroy(&options)
        .await
        .context("terraform destroy")?;
    Ok(())
}
