use crate::common::*;
use predicates::prelude::*;

#[test]
fn missing_container_suggests_close_name() {
    let home = TestHome::new();
    home.cmd().args(["create", "orders", "-e", "sqlite"]).assert().success();

    home.cmd()
        .args(["status", "ordrs"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("container 'ordrs' not found"))
        .stderr(predicate::str::contains("did you mean `orders`?"))
        .stderr(predicate::str::contains("help: run `dbrig list`"));
}

#[test]
fn unknown_engine_suggests_close_name() {
    let home = TestHome::new();
    home.cmd()
        .args(["create", "db", "-e", "postgresq"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown engine 'postgresq'"))
        .stderr(predicate::str::contains("postgresql"));
    assert!(home.list_json().is_empty());
}

#[test]
fn invalid_and_duplicate_names_are_rejected() {
    let home = TestHome::new();
    home.cmd()
        .args(["create", "-bad", "-e", "sqlite"])
        .assert()
        .failure();
    home.cmd()
        .args(["create", "has space", "-e", "sqlite"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid container name"));

    home.cmd().args(["create", "dup", "-e", "sqlite"]).assert().success();
    home.cmd()
        .args(["create", "dup", "-e", "duckdb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(home.list_json().len(), 1);
}

#[test]
fn rename_onto_existing_name_keeps_both() {
    let home = TestHome::new();
    home.cmd().args(["create", "one", "-e", "sqlite"]).assert().success();
    home.cmd().args(["create", "two", "-e", "sqlite"]).assert().success();
    home.cmd()
        .args(["rename", "one", "two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert!(home.container_dir("sqlite", "one").join("container.json").is_file());
    assert_eq!(home.list_json().len(), 2);
}

#[test]
fn server_engine_without_binary_is_reported() {
    let home = TestHome::with_config(
        r#"
[engines.weaviate]
bin_dir = "/nonexistent/weaviate/bin"
"#,
    );
    if dbrig::platform::find_executable("weaviate").is_some() {
        return;
    }
    home.cmd()
        .args(["create", "vectors", "-e", "weaviate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("binary 'weaviate' is not installed"))
        .stderr(predicate::str::contains("bin_dir"));
    assert!(home.list_json().is_empty());
}

#[test]
fn stop_all_with_nothing_running() {
    let home = TestHome::new();
    home.cmd()
        .args(["stop", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No running containers"));
}
