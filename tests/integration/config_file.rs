use crate::common::*;
use predicates::prelude::*;

#[test]
fn unknown_engine_section_is_an_error() {
    let home = TestHome::with_config("[engines.postgre]\nport = 5440\n");
    home.cmd()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[engines.postgre]"))
        .stderr(predicate::str::contains("config.toml"));
}

#[test]
fn malformed_duration_is_an_error() {
    let home = TestHome::with_config("[timeouts]\nstart = \"soon\"\n");
    home.cmd()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn home_flag_overrides_environment() {
    let env_home = TestHome::new();
    let flag_home = TestHome::new();
    env_home
        .cmd()
        .args(["--home", flag_home.path().to_str().unwrap()])
        .args(["create", "here", "-e", "sqlite"])
        .assert()
        .success();
    assert!(flag_home.container_dir("sqlite", "here").is_dir());
    assert!(env_home.list_json().is_empty());
}

#[test]
fn empty_list_explains_next_step() {
    let home = TestHome::new();
    home.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No containers found"));
}

#[test]
fn doctor_reports_every_engine() {
    let home = TestHome::new();
    home.cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbrig doctor"))
        .stdout(predicate::str::contains("sqlite"))
        .stdout(predicate::str::contains("clickhouse"));
}
