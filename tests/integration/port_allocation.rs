use crate::common::*;
use predicates::prelude::*;
use std::net::TcpListener;
use std::path::Path;

/// A data root whose config points redis at a placeholder redis-server,
/// enough for `create`.
fn redis_home(port: u16) -> TestHome {
    let home = TestHome::new();
    let bin = home.path().join("fakebin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(
        bin.join(format!("redis-server{}", std::env::consts::EXE_SUFFIX)),
        "",
    )
    .unwrap();
    std::fs::write(home.path().join("config.toml"), redis_config(&bin, port)).unwrap();
    home
}

fn redis_config(bin: &Path, port: u16) -> String {
    format!(
        "[engines.redis]\nport = {}\nbin_dir = '{}'\n",
        port,
        bin.display()
    )
}

#[test]
fn explicit_port_in_use_is_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = listener.local_addr().unwrap().port();
    let home = redis_home(free_port());

    home.cmd()
        .args(["create", "cache", "-e", "redis", "-p", &taken.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains(format!("port {} is unavailable", taken)));
    assert!(home.list_json().is_empty());
}

#[test]
fn busy_default_port_is_skipped() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = listener.local_addr().unwrap().port();
    let home = redis_home(taken);

    home.cmd()
        .args(["create", "cache", "-e", "redis"])
        .assert()
        .success();

    let listed = home.list_json();
    let port = listed[0]["port"].as_u64().unwrap() as u16;
    assert_ne!(port, taken);
    assert!(port > taken);
}

#[test]
fn registered_ports_are_not_handed_out_twice() {
    let home = redis_home(free_port());
    home.cmd().args(["create", "a", "-e", "redis"]).assert().success();
    home.cmd().args(["create", "b", "-e", "redis"]).assert().success();

    let listed = home.list_json();
    assert_eq!(listed.len(), 2);
    assert_ne!(listed[0]["port"], listed[1]["port"]);

    let first = listed[0]["port"].as_u64().unwrap().to_string();
    home.cmd()
        .args(["create", "c", "-e", "redis", "-p", &first])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is unavailable"));
}

#[test]
fn clone_gets_its_own_port() {
    let home = redis_home(free_port());
    home.cmd().args(["create", "a", "-e", "redis"]).assert().success();
    home.cmd()
        .args(["clone", "a", "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("on port"));

    let listed = home.list_json();
    assert_eq!(listed.len(), 2);
    assert_ne!(listed[0]["port"], listed[1]["port"]);
}
