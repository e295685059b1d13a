use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::{GracefulSignal, PlatformTimings, TerminateMode};

pub const NULL_DEVICE: &str = "/dev/null";

pub const TIMINGS: PlatformTimings = PlatformTimings {
    port_release: Duration::from_secs(5),
    settle: Duration::from_millis(300),
    confirm_timeout: Duration::from_secs(5),
    grace_factor: 1,
};

pub const RELIABLE_SPAWN_CONFIRMATION: bool = true;

pub const FULL_COMMAND_LINE: bool = true;

pub fn configure_detached(cmd: &mut Command) {
    // New process group: terminal signals aimed at us do not reach the server.
    cmd.process_group(0);
}

pub fn is_process_alive(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => !is_zombie(pid),
        // Exists but owned by someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// An exited child nobody has reaped yet still answers signal 0.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    // comm may contain spaces; the state follows the closing paren
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .is_some_and(|state| state == "Z" || state == "X")
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

pub fn terminate(pid: u32, mode: TerminateMode) -> std::io::Result<()> {
    let signal = match mode {
        TerminateMode::Graceful(GracefulSignal::Term) => Signal::SIGTERM,
        TerminateMode::Graceful(GracefulSignal::Interrupt) => Signal::SIGINT,
        TerminateMode::Graceful(GracefulSignal::Quit) => Signal::SIGQUIT,
        TerminateMode::Forceful => Signal::SIGKILL,
    };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => {
            debug!(pid, signal = %signal, "signal sent");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            debug!(pid, "process already exited");
            Ok(())
        }
        Err(e) => Err(std::io::Error::from(e)),
    }
}

pub fn extra_search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
        PathBuf::from("/usr/sbin"),
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/opt/homebrew/sbin"),
        PathBuf::from("/usr/local/sbin"),
    ];
    // Debian-style versioned PostgreSQL installs.
    if let Ok(entries) = std::fs::read_dir("/usr/lib/postgresql") {
        let mut versions: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path().join("bin"))
            .filter(|p| p.is_dir())
            .collect();
        versions.sort();
        versions.reverse();
        dirs.extend(versions);
    }
    dirs
}

/// Home of the invoking user when running under `sudo`.
pub fn elevated_user_home() -> Option<PathBuf> {
    if !nix::unistd::geteuid().is_root() {
        return None;
    }
    let sudo_user = std::env::var("SUDO_USER").ok()?;
    if sudo_user.is_empty() || sudo_user == "root" {
        return None;
    }
    match nix::unistd::User::from_name(&sudo_user) {
        Ok(Some(user)) => Some(user.dir),
        _ => {
            debug!(user = %sudo_user, "SUDO_USER not found in passwd");
            None
        }
    }
}

#[cfg(target_os = "linux")]
pub fn find_processes_on_port(port: u16) -> Vec<u32> {
    let port_hex = format!("{:04X}", port);

    let mut inodes: Vec<String> = Vec::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        let Ok(content) = std::fs::read_to_string(table) else {
            continue;
        };
        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                continue;
            }
            // 0A = TCP_LISTEN
            if fields[3] != "0A" {
                continue;
            }
            let local_port = fields[1].rsplit(':').next();
            if local_port == Some(port_hex.as_str()) && fields[9] != "0" {
                inodes.push(fields[9].to_string());
            }
        }
    }
    if inodes.is_empty() {
        return Vec::new();
    }

    let targets: Vec<String> = inodes
        .iter()
        .map(|inode| format!("socket:[{}]", inode))
        .collect();

    let Ok(proc_dir) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    let mut pids = Vec::new();
    for entry in proc_dir.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(fds) = std::fs::read_dir(format!("/proc/{}/fd", pid)) else {
            continue;
        };
        let owns_socket = fds.flatten().any(|fd| {
            std::fs::read_link(fd.path())
                .map(|link| targets.iter().any(|t| link.to_string_lossy() == t.as_str()))
                .unwrap_or(false)
        });
        if owns_socket {
            pids.push(pid);
        }
    }
    pids
}

#[cfg(not(target_os = "linux"))]
pub fn find_processes_on_port(port: u16) -> Vec<u32> {
    let output = std::process::Command::new("lsof")
        .args(["-nP", &format!("-iTCP:{}", port), "-sTCP:LISTEN", "-t"])
        .stderr(std::process::Stdio::null())
        .output();
    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|l| l.trim().parse::<u32>().ok())
            .collect(),
        Err(e) => {
            debug!(port, error = %e, "lsof unavailable");
            Vec::new()
        }
    }
}

#[cfg(target_os = "linux")]
pub fn process_command_line(pid: u32) -> Option<String> {
    let cmdline = std::fs::read_to_string(format!("/proc/{}/cmdline", pid)).ok()?;
    Some(cmdline.replace('\0', " ").trim().to_string())
}

#[cfg(not(target_os = "linux"))]
pub fn process_command_line(pid: u32) -> Option<String> {
    let output = std::process::Command::new("ps")
        .args(["-o", "command=", "-p", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Start time in clock ticks since boot (field 22 of `/proc/<pid>/stat`).
#[cfg(target_os = "linux")]
pub fn process_start_time(pid: u32) -> Option<String> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // Fields after the closing paren of comm start at field 3 (state).
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().nth(19).map(str::to_string)
}

#[cfg(not(target_os = "linux"))]
pub fn process_start_time(pid: u32) -> Option<String> {
    let output = std::process::Command::new("ps")
        .args(["-o", "lstart=", "-p", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .output()
        .ok()?;
    let started = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !started.is_empty()).then_some(started)
}
