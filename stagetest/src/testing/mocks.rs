//! In-memory collaborator fakes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{ConnectionError, ProvisioningError};
use crate::provisioning::{Outputs, Provisioner, TerraformOptions};
use crate::resource::{ConnectionDescriptor, ExecResult, SqlConnection, SqlConnector};

/// One call observed by [`FakeProvisioner`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionerCall {
    /// `init_and_apply` with the given options.
    InitAndApply(TerraformOptions),
    /// `destroy` with the given options.
    Destroy(TerraformOptions),
    /// `outputs` with the given options.
    Outputs(TerraformOptions),
}

impl ProvisionerCall {
    /// Short action name (`apply`, `destroy`, `output`).
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::InitAndApply(_) => "apply",
            Self::Destroy(_) => "destroy",
            Self::Outputs(_) => "output",
        }
    }

    /// The options the call was made with.
    #[must_use]
    pub fn options(&self) -> &TerraformOptions {
        match self {
            Self::InitAndApply(o) | Self::Destroy(o) | Self::Outputs(o) => o,
        }
    }
}

/// A provisioner that pretends to apply a Cloud SQL module.
///
/// Outputs are derived from the applied variables the way the module
/// derives them (`instance_name`, `db_name`, `proxy_connection`,
/// `public_ip`); individual outputs can be overridden.
#[derive(Debug)]
pub struct FakeProvisioner {
    public_ip: String,
    overrides: Mutex<BTreeMap<String, serde_json::Value>>,
    apply_error: Mutex<Option<String>>,
    destroy_error: Mutex<Option<String>>,
    deployed: Mutex<Option<TerraformOptions>>,
    calls: Mutex<Vec<ProvisionerCall>>,
}

impl Default for FakeProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvisioner {
    /// Creates a fake whose instance answers on `10.0.0.5`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_public_ip("10.0.0.5")
    }

    /// Creates a fake whose instance answers on `public_ip`.
    #[must_use]
    pub fn with_public_ip(public_ip: impl Into<String>) -> Self {
        Self {
            public_ip: public_ip.into(),
            overrides: Mutex::new(BTreeMap::new()),
            apply_error: Mutex::new(None),
            destroy_error: Mutex::new(None),
            deployed: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replaces one derived output.
    pub fn set_output(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.overrides.lock().insert(key.into(), value.into());
    }

    /// Makes every following apply fail with `stderr`.
    pub fn fail_apply(&self, stderr: impl Into<String>) {
        *self.apply_error.lock() = Some(stderr.into());
    }

    /// Makes every following destroy fail with `stderr`.
    pub fn fail_destroy(&self, stderr: impl Into<String>) {
        *self.destroy_error.lock() = Some(stderr.into());
    }

    /// Whether resources currently exist.
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        self.deployed.lock().is_some()
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProvisionerCall> {
        self.calls.lock().clone()
    }

    /// Action names of every call made so far.
    #[must_use]
    pub fn actions(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(ProvisionerCall::action).collect()
    }

    /// Number of calls with the given action name.
    #[must_use]
    pub fn count(&self, action: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.action() == action)
            .count()
    }

    fn failure(command: &str, stderr: &str) -> ProvisioningError {
        ProvisioningError::CommandFailed {
            command: command.to_string(),
            status: "exit status: 1".to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn derived_outputs(&self, options: &TerraformOptions) -> Outputs {
        let var = |name: &str| options.var_str(name).unwrap_or_default().to_string();
        let mut outputs = Outputs::new()
            .with("instance_name", var("name"))
            .with("db_name", var("db_name"))
            .with(
                "proxy_connection",
                format!("{}:{}:{}", var("project"), var("region"), var("name")),
            )
            .with("public_ip", self.public_ip.clone());
        for (key, value) in self.overrides.lock().iter() {
            outputs = outputs.with(key.clone(), value.clone());
        }
        outputs
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn init_and_apply(&self, options: &TerraformOptions) -> Result<Outputs, ProvisioningError> {
        self.calls
            .lock()
            .push(ProvisionerCall::InitAndApply(options.clone()));
        if let Some(stderr) = self.apply_error.lock().clone() {
            return Err(Self::failure("terraform apply", &stderr));
        }
        *self.deployed.lock() = Some(options.clone());
        Ok(self.derived_outputs(options))
    }

    async fn destroy(&self, options: &TerraformOptions) -> Result<(), ProvisioningError> {
        self.calls.lock().push(ProvisionerCall::Destroy(options.clone()));
        if let Some(stderr) = self.destroy_error.lock().clone() {
            return Err(Self::failure("terraform destroy", &stderr));
        }
        *self.deployed.lock() = None;
        Ok(())
    }

    async fn outputs(&self, options: &TerraformOptions) -> Result<Outputs, ProvisioningError> {
        self.calls.lock().push(ProvisionerCall::Outputs(options.clone()));
        let deployed = self.deployed.lock().clone();
        match deployed {
            Some(applied) => Ok(self.derived_outputs(&applied)),
            None => Err(Self::failure("terraform output", "no state: nothing has been applied")),
        }
    }
}

#[derive(Debug)]
struct ServerState {
    reachable: bool,
    ping_error: Option<String>,
    failing_statement: Option<(String, String)>,
    increment: i64,
    offset: i64,
    last_id: Option<i64>,
    rows: usize,
    table_exists: bool,
    opened: Vec<ConnectionDescriptor>,
    closed: usize,
    statements: Vec<String>,
}

/// An in-memory MySQL stand-in with one auto-increment table.
///
/// Ids follow `auto_increment_offset` / `auto_increment_increment`: the
/// first insert gets `offset`, each following insert adds `increment`.
/// Emptying the table does not reset the counter.
#[derive(Debug, Clone)]
pub struct FakeSqlServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for FakeSqlServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSqlServer {
    /// A server configured with auto-increment step 5.
    #[must_use]
    pub fn new() -> Self {
        Self::with_auto_increment(5, 5)
    }

    /// A server with explicit auto-increment settings.
    #[must_use]
    pub fn with_auto_increment(increment: i64, offset: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                reachable: true,
                ping_error: None,
                failing_statement: None,
                increment,
                offset,
                last_id: None,
                rows: 0,
                table_exists: false,
                opened: Vec::new(),
                closed: 0,
                statements: Vec::new(),
            })),
        }
    }

    /// Refuses every connection attempt.
    pub fn set_unreachable(&self) {
        self.state.lock().reachable = false;
    }

    /// Makes pings fail with `reason`.
    pub fn fail_ping(&self, reason: impl Into<String>) {
        self.state.lock().ping_error = Some(reason.into());
    }

    /// Makes statements starting with `prefix` fail with `reason`.
    pub fn fail_statement(&self, prefix: impl Into<String>, reason: impl Into<String>) {
        self.state.lock().failing_statement = Some((prefix.into(), reason.into()));
    }

    /// Descriptors of every opened connection.
    #[must_use]
    pub fn opened(&self) -> Vec<ConnectionDescriptor> {
        self.state.lock().opened.clone()
    }

    /// Number of connections closed.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Number of connections opened and not closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        let state = self.state.lock();
        state.opened.len() - state.closed
    }

    /// Every statement executed, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Rows currently in the table.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.state.lock().rows
    }

    fn execute(&self, statement: &str) -> Result<ExecResult, ConnectionError> {
        let mut state = self.state.lock();
        state.statements.push(statement.to_string());

        if let Some((prefix, reason)) = &state.failing_statement {
            if statement.starts_with(prefix.as_str()) {
                return Err(ConnectionError::Statement {
                    statement: statement.to_string(),
                    reason: reason.clone(),
                });
            }
        }

        let verb = statement
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if verb != "CREATE" && !state.table_exists {
            return Err(ConnectionError::Statement {
                statement: statement.to_string(),
                reason: "Error 1146: Table 'testdb.test' doesn't exist".to_string(),
            });
        }

        match verb.as_str() {
            "CREATE" => {
                state.table_exists = true;
                Ok(ExecResult::default())
            }
            "DELETE" => {
                let removed = state.rows;
                state.rows = 0;
                Ok(ExecResult {
                    last_insert_id: 0,
                    rows_affected: removed as u64,
                })
            }
            "INSERT" => {
                let id = state
                    .last_id
                    .map_or(state.offset, |last| last + state.increment);
                state.last_id = Some(id);
                state.rows += 1;
                Ok(ExecResult {
                    last_insert_id: id,
                    rows_affected: 1,
                })
            }
            _ => Err(ConnectionError::Statement {
                statement: statement.to_string(),
                reason: "unsupported statement".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SqlConnector for FakeSqlServer {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlConnection>, ConnectionError> {
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(ConnectionError::Open {
                target: descriptor.target(),
                reason: "connection refused".to_string(),
            });
        }
        state.opened.push(descriptor.clone());
        Ok(Box::new(FakeSqlConnection {
            server: self.clone(),
            target: descriptor.target(),
            closed: false,
        }))
    }
}

/// A connection handed out by [`FakeSqlServer`].
#[derive(Debug)]
pub struct FakeSqlConnection {
    server: FakeSqlServer,
    target: String,
    closed: bool,
}

#[async_trait]
impl SqlConnection for FakeSqlConnection {
    async fn ping(&mut self) -> Result<(), ConnectionError> {
        match self.server.state.lock().ping_error.clone() {
            Some(reason) => Err(ConnectionError::Ping {
                target: self.target.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn execute(
        &mut self,
        statement: &str,
        _params: &[serde_json::Value],
    ) -> Result<ExecResult, ConnectionError> {
        self.server.execute(statement)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.server.state.lock().closed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn options() -> TerraformOptions {
        TerraformOptions::new("/tmp/module")
            .with_var("name", "mysql-test-abc123")
            .with_var("project", "proj-1")
            .with_var("region", "us-central1")
            .with_var("db_name", "testdb")
    }

    #[tokio::test]
    async fn test_provisioner_derives_outputs() {
        let fake = FakeProvisioner::new();
        let applied = fake.init_and_apply(&options()).await.unwrap();

        assert_eq!(applied.string("instance_name").unwrap(), "mysql-test-abc123");
        assert_eq!(
            applied.string("proxy_connection").unwrap(),
            "proj-1:us-central1:mysql-test-abc123"
        );
        assert_eq!(fake.outputs(&options()).await.unwrap(), applied);
        assert!(fake.is_deployed());
    }

    #[tokio::test]
    async fn test_provisioner_outputs_require_apply() {
        let fake = FakeProvisioner::new();
        assert!(fake.outputs(&options()).await.is_err());

        fake.init_and_apply(&options()).await.unwrap();
        fake.destroy(&options()).await.unwrap();
        assert!(!fake.is_deployed());
        assert_eq!(fake.actions(), vec!["output", "apply", "destroy"]);
    }

    #[tokio::test]
    async fn test_provisioner_failures() {
        let fake = FakeProvisioner::new();
        fake.fail_apply("Error 403: quota exceeded");
        fake.fail_destroy("Error 409: still in use");

        let err = fake.init_and_apply(&options()).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(fake.destroy(&options()).await.is_err());
        assert_eq!(fake.count("apply"), 1);
        assert_eq!(fake.count("destroy"), 1);
    }

    #[tokio::test]
    async fn test_sql_server_auto_increment() {
        let server = FakeSqlServer::new();
        let descriptor = ConnectionDescriptor::mysql("u", "p", "10.0.0.5", "testdb");
        let mut conn = server.open(&descriptor).await.unwrap();

        conn.execute("CREATE TABLE test (id int)", &[]).await.unwrap();
        let first = conn.execute("INSERT INTO test(name) VALUES(?)", &[]).await.unwrap();
        let second = conn.execute("INSERT INTO test(name) VALUES(?)", &[]).await.unwrap();
        let deleted = conn.execute("DELETE FROM test", &[]).await.unwrap();
        let third = conn.execute("INSERT INTO test(name) VALUES(?)", &[]).await.unwrap();

        assert_eq!(first.last_insert_id, 5);
        assert_eq!(second.last_insert_id, 10);
        assert_eq!(deleted.rows_affected, 2);
        assert_eq!(third.last_insert_id, 15);
        assert_eq!(server.row_count(), 1);

        conn.close().await;
        conn.close().await;
        assert_eq!(server.closed(), 1);
        assert_eq!(server.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_sql_server_missing_table() {
        let server = FakeSqlServer::new();
        let descriptor = ConnectionDescriptor::mysql("u", "p", "h", "testdb");
        let mut conn = server.open(&descriptor).await.unwrap();

        let err = conn.execute("DELETE FROM test", &[]).await.unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
    }

    #[tokio::test]
    async fn test_sql_server_unreachable() {
        let server = FakeSqlServer::new();
        server.set_unreachable();
        let descriptor = ConnectionDescriptor::mysql("u", "secret", "10.9.9.9", "testdb");

        let err = server.open(&descriptor).await.err().unwrap();
        assert!(err.to_string().contains("10.9.9.9:3306"));
        assert!(!err.to_string().contains("secret"));
    }
}
