#![allow(dead_code)]
use assert_cmd::Command;
use assert_fs::TempDir;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

/// An isolated data root for one test.
pub struct TestHome {
    pub dir: TempDir,
}

impl TestHome {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Start from a `config.toml` in the data root.
    pub fn with_config(config_toml: &str) -> Self {
        let home = Self::new();
        std::fs::write(home.dir.path().join("config.toml"), config_toml).unwrap();
        home
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn container_dir(&self, engine: &str, name: &str) -> PathBuf {
        self.path().join("containers").join(engine).join(name)
    }

    /// `dbrig` pointed at this data root, with the network check off.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dbrig").unwrap();
        cmd.env("DBRIG_HOME", self.path())
            .env("DBRIG_NO_UPDATE_CHECK", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run `dbrig list --json` and return the parsed records.
    pub fn list_json(&self) -> Vec<serde_json::Value> {
        let output = self.cmd().args(["list", "--json"]).output().unwrap();
        assert!(output.status.success(), "list failed: {:?}", output);
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
