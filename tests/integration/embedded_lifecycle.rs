use crate::common::*;
use predicates::prelude::*;

#[test]
fn create_start_stop_delete_sqlite() {
    let home = TestHome::new();

    home.cmd()
        .args(["create", "notes", "--engine", "sqlite"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created notes (sqlite"));

    let dir = home.container_dir("sqlite", "notes");
    assert!(dir.join("container.json").is_file());
    assert!(dir.join("data/notes.sqlite").is_file());

    let listed = home.list_json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "notes");
    assert_eq!(listed[0]["engine"], "sqlite");
    assert_eq!(listed[0]["status"], "created");
    assert!(listed[0]["port"].is_null());

    home.cmd()
        .args(["start", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlite://"));
    home.cmd()
        .args(["start", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already running"));
    home.cmd()
        .args(["status", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running"));

    home.cmd()
        .args(["stop", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stopped notes"));
    home.cmd()
        .args(["stop", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));

    home.cmd().args(["delete", "notes"]).assert().success();
    assert!(!dir.exists());
    assert!(home.list_json().is_empty());
}

#[test]
fn url_prints_connection_string() {
    let home = TestHome::new();
    home.cmd()
        .args(["create", "analytics", "-e", "duckdb"])
        .assert()
        .success();
    home.cmd()
        .args(["url", "analytics"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("duckdb://"))
        .stdout(predicate::str::contains("analytics.duckdb"));
}

#[test]
fn rename_moves_files_and_frees_old_name() {
    let home = TestHome::new();
    home.cmd().args(["create", "a", "-e", "sqlite"]).assert().success();

    home.cmd()
        .args(["rename", "a", "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed a to b"));

    assert!(!home.container_dir("sqlite", "a").exists());
    assert!(home.container_dir("sqlite", "b").join("data/b.sqlite").is_file());
    home.cmd()
        .args(["status", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    home.cmd().args(["start", "b"]).assert().success();
}

#[test]
fn clone_copies_data_under_new_name() {
    let home = TestHome::new();
    home.cmd().args(["create", "src", "-e", "sqlite"]).assert().success();
    let db = home.container_dir("sqlite", "src").join("data/src.sqlite");
    std::fs::write(&db, b"payload").unwrap();

    home.cmd()
        .args(["clone", "src", "copy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cloned src to copy"));

    let copied = home.container_dir("sqlite", "copy").join("data/copy.sqlite");
    assert_eq!(std::fs::read(copied).unwrap(), b"payload");

    let listed = home.list_json();
    let copy = listed.iter().find(|c| c["name"] == "copy").unwrap();
    assert_eq!(copy["cloned_from"], "src");
    assert_eq!(copy["status"], "created");
}

#[test]
fn running_embedded_container_needs_force_to_delete() {
    let home = TestHome::new();
    home.cmd().args(["create", "live", "-e", "sqlite"]).assert().success();
    home.cmd().args(["start", "live"]).assert().success();

    home.cmd()
        .args(["delete", "live"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is running"))
        .stderr(predicate::str::contains("dbrig stop live"));
    home.cmd().args(["delete", "live", "--force"]).assert().success();
    assert!(home.list_json().is_empty());
}

#[test]
fn engines_lists_every_engine() {
    let home = TestHome::new();
    home.cmd()
        .arg("engines")
        .assert()
        .success()
        .stdout(predicate::str::contains("postgresql"))
        .stdout(predicate::str::contains("5432"))
        .stdout(predicate::str::contains("questdb"))
        .stdout(predicate::str::contains("embedded"));
}
