//! End-to-end runs of the staged Cloud SQL test against in-memory
//! collaborators.

use super::*;
use crate::errors::ProvisioningError;
use crate::events::StageEventKind;
use crate::provisioning::{MockProvisioner, Outputs, TerraformOptions};
use crate::resource::MockSqlConnector;
use crate::skip::MapDirectives;
use crate::testing::{
    assert_stage_failed_with, assert_stage_ok, assert_stage_order, assert_stage_skipped,
    assert_state_keys, FakeProvisioner, FakeSqlServer, TestFixture,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;

const ALL_STAGES: [&str; 5] = [
    STAGE_BOOTSTRAP,
    STAGE_DEPLOY,
    STAGE_VALIDATE_OUTPUTS,
    STAGE_SQL_TESTS,
    STAGE_TEARDOWN,
];

fn fixed_values() -> BootstrapValues {
    BootstrapValues::new("mysql-test-abc123", "us-central1", "proj-1")
}

fn cloudsql_test(
    provisioner: Arc<dyn Provisioner>,
    server: &FakeSqlServer,
) -> CloudSqlMySqlTest {
    CloudSqlMySqlTest::new(provisioner, Arc::new(server.clone()), StagetestConfig::default())
        .with_bootstrap(fixed_values())
}

async fn run_in(fixture: &TestFixture, test: &CloudSqlMySqlTest) -> TestSummary {
    let root = fixture.test_dir().to_path_buf();
    let staged = test.staged_test(&root, fixture.policy(), fixture.sink());
    test.run(staged, &root).await
}

fn module_store(fixture: &TestFixture) -> StateStore {
    StateStore::new(module_dir(fixture.test_dir()))
}

#[tokio::test]
async fn test_full_run_passes() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let provisioner = Arc::new(FakeProvisioner::new());
    let server = FakeSqlServer::new();

    let summary = run_in(&fixture, &cloudsql_test(provisioner.clone(), &server)).await;

    assert!(summary.passed(), "{summary:?}");
    assert_stage_order(&summary, &ALL_STAGES);

    let store = module_store(&fixture);
    assert_state_keys(
        &store,
        &["TerraformOptions", "instance-name", "project-id", "region"],
    );
    assert_eq!(store.load_string(KEY_INSTANCE_NAME).unwrap(), "mysql-test-abc123");
    assert_eq!(store.load_string(KEY_REGION).unwrap(), "us-central1");
    assert_eq!(store.load_string(KEY_PROJECT_ID).unwrap(), "proj-1");

    let options = store.load_terraform_options().unwrap();
    assert_eq!(options.terraform_dir, module_dir(dir.path()));
    assert_eq!(options.var_str("db_name"), Some("testdb"));
    assert_eq!(options.var_str("master_username"), Some("testuser"));

    assert_eq!(provisioner.actions(), vec!["apply", "output", "output", "destroy"]);
    assert!(!provisioner.is_deployed());

    let opened = server.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].dsn(), "testuser:testpassword@tcp(10.0.0.5:3306)/testdb");
    assert_eq!(
        server.statements(),
        vec![CREATE_TABLE, EMPTY_TABLE, INSERT_ROW]
    );
    assert_eq!(server.row_count(), 1);
    assert_eq!(server.open_connections(), 0);
}

#[tokio::test]
async fn test_full_run_events() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let server = FakeSqlServer::new();

    run_in(&fixture, &cloudsql_test(Arc::new(FakeProvisioner::new()), &server)).await;

    let transitions = fixture.sink().transitions();
    assert_eq!(transitions.len(), ALL_STAGES.len() * 2);
    assert_eq!(
        transitions.last().cloned(),
        Some((STAGE_TEARDOWN.to_string(), StageEventKind::Completed))
    );
    assert!(fixture.sink().events_for(STAGE_TEARDOWN)[0].deferred);
}

#[tokio::test]
async fn test_failed_deploy_still_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let provisioner = Arc::new(FakeProvisioner::new());
    provisioner.fail_apply("Error 403: quota exceeded");
    let server = FakeSqlServer::new();

    let summary = run_in(&fixture, &cloudsql_test(provisioner.clone(), &server)).await;

    assert!(!summary.passed());
    assert_stage_failed_with(&summary, STAGE_DEPLOY, "quota exceeded");
    assert_stage_ok(&summary, STAGE_TEARDOWN);
    assert_eq!(provisioner.count("destroy"), 1);
    assert!(server.opened().is_empty());

    // Options were persisted before apply, so destroy targets the same module.
    let destroyed = provisioner.calls().last().unwrap().options().clone();
    assert_eq!(destroyed.var_str("name"), Some("mysql-test-abc123"));
}

#[tokio::test]
async fn test_failed_deploy_with_mocks() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());

    let mut provisioner = MockProvisioner::new();
    provisioner
        .expect_init_and_apply()
        .times(1)
        .returning(|_| {
            Err(ProvisioningError::CommandFailed {
                command: "terraform apply".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Error: googleapi: Error 409: instance name already used".to_string(),
            })
        });
    provisioner
        .expect_outputs()
        .times(2)
        .returning(|_| Err(ProvisioningError::output_missing("instance_name")));
    provisioner.expect_destroy().times(1).returning(|_| Ok(()));

    let mut connector = MockSqlConnector::new();
    connector.expect_open().never();

    let test = CloudSqlMySqlTest::new(
        Arc::new(provisioner),
        Arc::new(connector),
        StagetestConfig::default(),
    )
    .with_bootstrap(fixed_values());
    let summary = run_in(&fixture, &test).await;

    assert_eq!(
        summary.failed_stages(),
        vec![STAGE_DEPLOY, STAGE_VALIDATE_OUTPUTS, STAGE_SQL_TESTS]
    );
    assert_stage_ok(&summary, STAGE_TEARDOWN);
}

/// Panics on apply; everything else goes to the wrapped fake.
struct PanickingProvisioner(Arc<FakeProvisioner>);

#[async_trait]
impl Provisioner for PanickingProvisioner {
    async fn init_and_apply(&self, _options: &TerraformOptions) -> Result<Outputs, ProvisioningError> {
        panic!("provider plugin crashed");
    }

    async fn destroy(&self, options: &TerraformOptions) -> Result<(), ProvisioningError> {
        self.0.destroy(options).await
    }

    async fn outputs(&self, options: &TerraformOptions) -> Result<Outputs, ProvisioningError> {
        self.0.outputs(options).await
    }
}

#[tokio::test]
async fn test_panicking_deploy_still_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let fake = Arc::new(FakeProvisioner::new());
    let server = FakeSqlServer::new();

    let test = cloudsql_test(Arc::new(PanickingProvisioner(fake.clone())), &server);
    let summary = run_in(&fixture, &test).await;

    assert_stage_failed_with(&summary, STAGE_DEPLOY, "provider plugin crashed");
    assert_stage_ok(&summary, STAGE_TEARDOWN);
    assert_eq!(fake.count("destroy"), 1);
}

#[tokio::test]
async fn test_skipping_every_stage_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = ALL_STAGES
        .iter()
        .fold(TestFixture::new(dir.path()), |f, stage| f.skipping(stage));
    let provisioner = Arc::new(FakeProvisioner::new());
    let server = FakeSqlServer::new();

    let summary = run_in(&fixture, &cloudsql_test(provisioner.clone(), &server)).await;

    assert!(summary.passed());
    for stage in ALL_STAGES {
        assert_stage_skipped(&summary, stage);
    }
    assert_state_keys(&module_store(&fixture), &[]);
    assert!(provisioner.calls().is_empty());
    assert!(server.opened().is_empty());
}

#[tokio::test]
async fn test_skipped_bootstrap_persists_nothing_of_its_own() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path())
        .skipping(STAGE_BOOTSTRAP)
        .skipping(STAGE_TEARDOWN);
    let provisioner = Arc::new(FakeProvisioner::new());
    let server = FakeSqlServer::new();

    let summary = run_in(&fixture, &cloudsql_test(provisioner.clone(), &server)).await;

    assert_stage_skipped(&summary, STAGE_BOOTSTRAP);
    assert_stage_failed_with(&summary, STAGE_DEPLOY, "instance-name");
    assert_state_keys(&module_store(&fixture), &[]);
    assert!(provisioner.calls().is_empty());
}

#[tokio::test]
async fn test_resume_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let provisioner = Arc::new(FakeProvisioner::new());
    let server = FakeSqlServer::new();

    let first = TestFixture::new(dir.path()).skipping(STAGE_TEARDOWN);
    let summary = run_in(&first, &cloudsql_test(provisioner.clone(), &server)).await;
    assert!(summary.passed(), "{summary:?}");
    assert_stage_skipped(&summary, STAGE_TEARDOWN);
    assert!(provisioner.is_deployed());

    // A second invocation without fixed bootstrap values: it must never
    // need them because bootstrap and deploy are skipped.
    let second = TestFixture::new(dir.path())
        .skipping(STAGE_BOOTSTRAP)
        .skipping(STAGE_DEPLOY);
    let resumed = CloudSqlMySqlTest::new(
        provisioner.clone(),
        Arc::new(server.clone()),
        StagetestConfig::default(),
    )
    .with_environment(Arc::new(MapDirectives::new()));
    let summary = run_in(&second, &resumed).await;

    assert!(summary.passed(), "{summary:?}");
    assert_stage_ok(&summary, STAGE_VALIDATE_OUTPUTS);
    assert_stage_ok(&summary, STAGE_SQL_TESTS);
    assert_stage_ok(&summary, STAGE_TEARDOWN);
    assert_eq!(provisioner.count("apply"), 1);
    assert_eq!(provisioner.count("destroy"), 1);
    assert!(!provisioner.is_deployed());

    // Emptying the table does not reset the counter: ids 5 then 10.
    assert_eq!(server.row_count(), 1);
    assert_eq!(server.opened().len(), 2);
    assert_eq!(server.open_connections(), 0);
}

#[tokio::test]
async fn test_wrong_auto_increment_fails_sql_tests() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let provisioner = Arc::new(FakeProvisioner::new());
    let server = FakeSqlServer::with_auto_increment(1, 1);

    let summary = run_in(&fixture, &cloudsql_test(provisioner.clone(), &server)).await;

    assert_eq!(summary.failed_stages(), vec![STAGE_SQL_TESTS]);
    assert_stage_failed_with(&summary, STAGE_SQL_TESTS, "last_insert_id % 5");
    assert_stage_ok(&summary, STAGE_TEARDOWN);
    assert_eq!(server.open_connections(), 0);
}

#[tokio::test]
async fn test_unreachable_instance_fails_sql_tests() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let server = FakeSqlServer::new();
    server.set_unreachable();

    let summary = run_in(&fixture, &cloudsql_test(Arc::new(FakeProvisioner::new()), &server)).await;

    assert_stage_failed_with(&summary, STAGE_SQL_TESTS, "10.0.0.5:3306");
    let error = summary.stage(STAGE_SQL_TESTS).unwrap().error.clone().unwrap();
    assert!(!error.contains(DB_PASS));
}

#[tokio::test]
async fn test_output_mismatch_fails_validate_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new(dir.path());
    let provisioner = Arc::new(FakeProvisioner::new());
    provisioner.set_output("instance_name", "mysql-test-other");

    let summary = run_in(&fixture, &cloudsql_test(provisioner.clone(), &FakeSqlServer::new())).await;

    assert_eq!(summary.failed_stages(), vec![STAGE_VALIDATE_OUTPUTS]);
    assert_stage_failed_with(&summary, STAGE_VALIDATE_OUTPUTS, "mysql-test-other");
}

#[tokio::test]
async fn test_discovered_bootstrap_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StagetestConfig::default();
    config.cloudsql.regions = vec!["europe-west1".to_string()];
    let fixture = [STAGE_DEPLOY, STAGE_VALIDATE_OUTPUTS, STAGE_SQL_TESTS, STAGE_TEARDOWN]
        .iter()
        .fold(TestFixture::new(dir.path()), |f, stage| f.skipping(stage));
    let test = CloudSqlMySqlTest::new(
        Arc::new(FakeProvisioner::new()),
        Arc::new(FakeSqlServer::new()),
        config,
    )
    .with_environment(Arc::new(
        MapDirectives::new().with("GOOGLE_CLOUD_PROJECT", "proj-9"),
    ));

    let summary = run_in(&fixture, &test).await;
    assert!(summary.passed(), "{summary:?}");

    let store = module_store(&fixture);
    let instance = store.load_string(KEY_INSTANCE_NAME).unwrap();
    assert!(instance.starts_with("mysql-test-"));
    assert_eq!(instance.len(), "mysql-test-".len() + crate::bootstrap::UNIQUE_ID_LEN);
    assert_eq!(instance, instance.to_lowercase());
    assert_eq!(store.load_string(KEY_REGION).unwrap(), "europe-west1");
    assert_eq!(store.load_string(KEY_PROJECT_ID).unwrap(), "proj-9");
}

#[tokio::test]
async fn test_missing_project_fails_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = [STAGE_DEPLOY, STAGE_VALIDATE_OUTPUTS, STAGE_SQL_TESTS, STAGE_TEARDOWN]
        .iter()
        .fold(TestFixture::new(dir.path()), |f, stage| f.skipping(stage));
    let test = CloudSqlMySqlTest::new(
        Arc::new(FakeProvisioner::new()),
        Arc::new(FakeSqlServer::new()),
        StagetestConfig::default(),
    )
    .with_environment(Arc::new(MapDirectives::new()));

    let summary = run_in(&fixture, &test).await;

    assert_eq!(summary.failed_stages(), vec![STAGE_BOOTSTRAP]);
    assert_stage_failed_with(&summary, STAGE_BOOTSTRAP, "GOOGLE_CLOUD_PROJECT");
    assert_state_keys(&module_store(&fixture), &[]);
}

#[test]
fn test_prepare_root_copies_unless_resuming() {
    let repo = tempfile::tempdir().unwrap();
    let module = module_dir(repo.path());
    std::fs::create_dir_all(&module).unwrap();
    std::fs::write(module.join("main.tf"), "").unwrap();

    let root = CloudSqlMySqlTest::prepare_root(repo.path(), &SkipPolicy::never()).unwrap();
    assert_ne!(root, repo.path());
    assert!(module_dir(&root).join("main.tf").is_file());
    std::fs::remove_dir_all(&root).unwrap();

    let resuming = TestFixture::new(repo.path()).skipping(STAGE_BOOTSTRAP);
    let root = CloudSqlMySqlTest::prepare_root(repo.path(), &resuming.policy()).unwrap();
    assert_eq!(root, repo.path());
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_from_env_drives_terraform_binary() {
    use crate::provisioning::TerraformCli;
    use std::os::unix::fs::PermissionsExt;

    let repo = tempfile::tempdir().unwrap();
    let module = module_dir(repo.path());
    std::fs::create_dir_all(&module).unwrap();
    std::fs::write(module.join("main.tf"), "").unwrap();

    let bin = tempfile::tempdir().unwrap();
    let outputs = serde_json::json!({
        "instance_name": { "value": "mysql-test-abc123" },
        "db_name": { "value": "testdb" },
        "proxy_connection": { "value": "proj-1:us-central1:mysql-test-abc123" },
        "public_ip": { "value": "10.0.0.5" },
    });
    std::fs::write(bin.path().join("outputs.json"), outputs.to_string()).unwrap();
    let script = bin.path().join("terraform");
    let bin_dir = bin.path().display();
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\n\
             echo \"$1\" >> '{bin_dir}/commands'\n\
             if [ \"$1\" = apply ]; then pwd > '{bin_dir}/workdir'; fi\n\
             if [ \"$1\" = output ]; then cat '{bin_dir}/outputs.json'; fi\n\
             exit 0\n"
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = StagetestConfig::default();
    config.terraform.binary = script.display().to_string();
    config.terraform.time_between_retries_secs = 0;
    let server = FakeSqlServer::new();
    let test = CloudSqlMySqlTest::new(
        Arc::new(TerraformCli::from_config(&config.terraform)),
        Arc::new(server.clone()),
        config,
    )
    .with_bootstrap(fixed_values());

    let summary = test.run_from_env(repo.path()).await.unwrap();

    summary.assert_passed();
    assert_stage_order(&summary, &ALL_STAGES);
    let commands = std::fs::read_to_string(bin.path().join("commands")).unwrap();
    assert_eq!(
        commands.lines().collect::<Vec<_>>(),
        vec!["init", "apply", "output", "output", "output", "destroy"]
    );
    assert_eq!(server.statements(), vec![CREATE_TABLE, EMPTY_TABLE, INSERT_ROW]);
    assert_eq!(server.open_connections(), 0);

    // The run worked in a copy of the repository, not in the checkout.
    let workdir = std::fs::read_to_string(bin.path().join("workdir")).unwrap();
    let workdir = Path::new(workdir.trim());
    assert!(workdir.ends_with("examples/cloud-sql-mysql"), "{}", workdir.display());
    assert!(workdir.join(".test-data").is_dir());
    assert!(!module.join(".test-data").exists());
    if let Some(copy_root) = workdir.parent().and_then(Path::parent) {
        std::fs::remove_dir_all(copy_root).unwrap();
    }
}
