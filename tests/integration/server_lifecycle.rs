use crate::common::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// A data root with a fake redis: the server idles until signalled and the
/// client answers with `ping_reply`.
fn fake_redis(server_body: &str, ping_reply: &str, start_timeout: &str) -> (TestHome, u16) {
    let home = TestHome::new();
    let bin = home.path().join("fakebin");
    write_script(&bin, "redis-server", server_body);
    write_script(&bin, "redis-cli", &format!("echo {}", ping_reply));
    let port = free_port();
    std::fs::write(
        home.path().join("config.toml"),
        format!(
            "[engines.redis]\nport = {}\nbin_dir = '{}'\ngrace = \"2s\"\nstart_timeout = \"{}\"\n",
            port,
            bin.display(),
            start_timeout
        ),
    )
    .unwrap();
    (home, port)
}

fn pid_file(home: &TestHome) -> PathBuf {
    home.container_dir("redis", "cache").join("redis.pid")
}

fn read_pid(home: &TestHome) -> i32 {
    let content = std::fs::read_to_string(pid_file(home)).unwrap();
    let record: serde_json::Value = serde_json::from_str(&content).unwrap();
    record["pid"].as_i64().unwrap() as i32
}

/// A detached server is reparented once the CLI exits, so it may linger as
/// a zombie briefly before init reaps it.
fn wait_gone(pid: i32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid));
        let gone = match stat {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
            Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err(),
        };
        if gone {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn start_status_stop_server() {
    let (home, port) = fake_redis("while :; do sleep 1; done", "PONG", "20s");
    let _cleanup = scopeguard::guard((), |_| {
        let _ = home.cmd().args(["stop", "--all"]).timeout(CMD_TIMEOUT).output();
    });

    home.cmd()
        .args(["create", "cache", "-e", "redis"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("on port {}", port)));

    home.cmd()
        .args(["start", "cache"])
        .timeout(CMD_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("started"))
        .stdout(predicate::str::contains(format!("redis://127.0.0.1:{}", port)));

    let pid = read_pid(&home);
    assert!(nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok());

    home.cmd()
        .args(["start", "cache"])
        .timeout(CMD_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("already running"));
    assert_eq!(read_pid(&home), pid);

    home.cmd()
        .args(["status", "cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("PID {}", pid)));
    let listed = home.list_json();
    assert_eq!(listed[0]["status"], "running");

    home.cmd()
        .args(["delete", "cache"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is running"));

    home.cmd()
        .args(["stop", "cache"])
        .timeout(CMD_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("Stopped cache"));

    assert!(wait_gone(pid), "server {} still running after stop", pid);
    assert!(!pid_file(&home).exists());
    assert_eq!(home.list_json()[0]["status"], "stopped");
}

#[test]
fn server_that_never_answers_is_killed() {
    let (home, _port) = fake_redis("while :; do sleep 1; done", "LOADING", "2s");
    let _cleanup = scopeguard::guard((), |_| {
        let _ = home.cmd().args(["stop", "--all"]).timeout(CMD_TIMEOUT).output();
    });
    home.cmd()
        .args(["create", "cache", "-e", "redis"])
        .assert()
        .success();

    home.cmd()
        .args(["start", "cache"])
        .timeout(CMD_TIMEOUT)
        .assert()
        .failure()
        .stderr(predicate::str::contains("did not become ready"))
        .stderr(predicate::str::contains("redis.log"));

    assert!(!pid_file(&home).exists());
    assert_eq!(home.list_json()[0]["status"], "stopped");
}

#[test]
fn early_exit_is_reported_with_log() {
    let (home, _port) = fake_redis("echo 'fatal: bad config' >&2; exit 1", "", "10s");
    home.cmd()
        .args(["create", "cache", "-e", "redis"])
        .assert()
        .success();

    home.cmd()
        .args(["start", "cache"])
        .timeout(CMD_TIMEOUT)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start 'cache'"))
        .stderr(predicate::str::contains("exited during startup"));

    let log = std::fs::read_to_string(home.container_dir("redis", "cache").join("redis.log")).unwrap();
    assert!(log.contains("fatal: bad config"));
    assert!(!pid_file(&home).exists());
}

#[test]
fn stale_pid_file_is_ignored() {
    let (home, _port) = fake_redis("while :; do sleep 1; done", "PONG", "20s");
    let _cleanup = scopeguard::guard((), |_| {
        let _ = home.cmd().args(["stop", "--all"]).timeout(CMD_TIMEOUT).output();
    });
    home.cmd()
        .args(["create", "cache", "-e", "redis"])
        .assert()
        .success();

    // A PID that cannot belong to a live process.
    std::fs::write(
        pid_file(&home),
        r#"{"pid": 4194304, "spawned_at": "2024-01-01T00:00:00Z", "ports": []}"#,
    )
    .unwrap();
    home.cmd()
        .args(["status", "cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    home.cmd()
        .args(["start", "cache"])
        .timeout(CMD_TIMEOUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("started"));
    assert_ne!(read_pid(&home), 4194304);
}
