//! Benchmarks for the state store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stagetest::provisioning::TerraformOptions;
use stagetest::state::StateStore;

fn state_benchmark(c: &mut Criterion) {
    let dir = std::env::temp_dir().join(format!("stagetest-bench-{}", std::process::id()));
    let store = StateStore::new(&dir);
    let options = TerraformOptions::new(dir.join("examples").join("cloud-sql-mysql"))
        .with_var("region", "us-central1")
        .with_var("project", "proj-1")
        .with_var("name", "mysql-test-abc123")
        .with_var("db_name", "testdb");

    c.bench_function("save_string", |b| {
        b.iter(|| store.save_string(black_box("region"), black_box("us-central1")))
    });

    store.save_string("region", "us-central1").ok();
    c.bench_function("load_string", |b| {
        b.iter(|| store.load_string(black_box("region")))
    });

    c.bench_function("save_load_terraform_options", |b| {
        b.iter(|| {
            store.save_terraform_options(black_box(&options)).ok();
            store.load_terraform_options()
        })
    });

    store.clear().ok();
}

criterion_group!(benches, state_benchmark);
criterion_main!(benches);
