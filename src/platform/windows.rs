use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use windows_sys::Win32::Foundation::{CloseHandle, FILETIME};
use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, GetProcessTimes, OpenProcess, TerminateProcess, CREATE_NEW_PROCESS_GROUP,
    CREATE_NO_WINDOW, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

use super::{PlatformTimings, TerminateMode};

pub const NULL_DEVICE: &str = "NUL";

// Windows keeps sockets and file handles around noticeably longer after
// process exit.
pub const TIMINGS: PlatformTimings = PlatformTimings {
    port_release: Duration::from_secs(20),
    settle: Duration::from_secs(2),
    confirm_timeout: Duration::from_secs(10),
    grace_factor: 2,
};

pub const RELIABLE_SPAWN_CONFIRMATION: bool = false;

// `tasklist` only reports the image name.
pub const FULL_COMMAND_LINE: bool = false;

const STILL_ACTIVE: u32 = 259;

pub fn configure_detached(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

pub fn is_process_alive(pid: u32) -> bool {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);
        result != 0 && exit_code == STILL_ACTIVE
    }
}

pub fn terminate(pid: u32, mode: TerminateMode) -> std::io::Result<()> {
    if !is_process_alive(pid) {
        debug!(pid, "process already exited");
        return Ok(());
    }
    match mode {
        TerminateMode::Graceful(_) => {
            unsafe {
                if GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) != 0 {
                    debug!(pid, "sent CTRL_BREAK_EVENT");
                    return Ok(());
                }
            }
            // No console to signal; taskkill without /F asks the window to close.
            let status = std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T"])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()?;
            if !status.success() {
                debug!(pid, "taskkill without /F was refused");
            }
            Ok(())
        }
        TerminateMode::Forceful => unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                // Gone between the liveness check and now.
                return Ok(());
            }
            let ok = TerminateProcess(handle, 1);
            CloseHandle(handle);
            if ok == 0 && is_process_alive(pid) {
                warn!(pid, "TerminateProcess failed");
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        },
    }
}

pub fn extra_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(program_files) = std::env::var_os("ProgramFiles") {
        let root = PathBuf::from(program_files);
        if let Ok(entries) = std::fs::read_dir(root.join("PostgreSQL")) {
            dirs.extend(entries.flatten().map(|e| e.path().join("bin")));
        }
        dirs.push(root.join("MongoDB").join("Server").join("bin"));
    }
    dirs
}

/// Elevation on Windows keeps the same profile, so there is nothing to redirect.
pub fn elevated_user_home() -> Option<PathBuf> {
    None
}

pub fn find_processes_on_port(port: u16) -> Vec<u32> {
    let output = match std::process::Command::new("netstat")
        .args(["-ano", "-p", "TCP"])
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            debug!(error = %e, "netstat unavailable");
            return Vec::new();
        }
    };
    let suffix = format!(":{}", port);
    let mut pids = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // Proto  Local  Foreign  State  PID
        if fields.len() < 5 || fields[3] != "LISTENING" || !fields[1].ends_with(&suffix) {
            continue;
        }
        if let Ok(pid) = fields[4].parse::<u32>() {
            if pid != 0 && !pids.contains(&pid) {
                pids.push(pid);
            }
        }
    }
    pids
}

pub fn process_command_line(pid: u32) -> Option<String> {
    let output = std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/FO", "CSV", "/NH"])
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?;
    let image = first.split(',').next()?.trim_matches('"').to_string();
    if image.is_empty() || image.starts_with("INFO:") {
        None
    } else {
        Some(image)
    }
}

/// Creation time as a FILETIME tick count.
pub fn process_start_time(pid: u32) -> Option<String> {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return None;
        }
        let mut creation: FILETIME = std::mem::zeroed();
        let mut exit: FILETIME = std::mem::zeroed();
        let mut kernel: FILETIME = std::mem::zeroed();
        let mut user: FILETIME = std::mem::zeroed();
        let ok = GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user);
        CloseHandle(handle);
        if ok == 0 {
            return None;
        }
        let ticks = ((creation.dwHighDateTime as u64) << 32) | creation.dwLowDateTime as u64;
        Some(ticks.to_string())
    }
}
