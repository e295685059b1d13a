use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as imp;
#[cfg(windows)]
use windows as imp;

/// Suffix appended to executable names (`""` on Unix, `".exe"` on Windows).
pub const EXE_SUFFIX: &str = std::env::consts::EXE_SUFFIX;

/// Path of the null device.
pub const NULL_DEVICE: &str = imp::NULL_DEVICE;

/// Host description used to pick binary builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub exe_suffix: &'static str,
}

impl PlatformInfo {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            exe_suffix: EXE_SUFFIX,
        }
    }

    /// `<os>-<arch>`, as used in managed install directory names.
    pub fn key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

/// Cooperative shutdown request. Windows has a single graceful path, so the
/// variant only matters on Unix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulSignal {
    Term,
    Interrupt,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateMode {
    Graceful(GracefulSignal),
    Forceful,
}

/// Wait durations that differ between operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformTimings {
    /// How long to poll for bound ports to free up after a process exits.
    pub port_release: Duration,
    /// Delay used to confirm a detached child is still alive after spawn.
    pub settle: Duration,
    /// Upper bound on spawn confirmation.
    pub confirm_timeout: Duration,
    /// Multiplier applied to engine grace periods.
    pub grace_factor: u32,
}

pub fn timings() -> PlatformTimings {
    imp::TIMINGS
}

/// Whether the OS reliably reports early exit of a freshly detached child.
/// Where it does not, the supervisor writes the PID file immediately and
/// relies on a fixed settle delay.
pub fn reliable_spawn_confirmation() -> bool {
    imp::RELIABLE_SPAWN_CONFIRMATION
}

/// Detach the command from the invoking terminal so that it outlives us and
/// does not receive our Ctrl-C.
pub fn configure_detached(cmd: &mut Command) {
    imp::configure_detached(cmd)
}

/// Check if a process with the given PID is still alive.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    imp::is_process_alive(pid)
}

/// Ask a process to exit (or kill it). Succeeds if the process is already gone.
pub fn terminate(pid: u32, mode: TerminateMode) -> std::io::Result<()> {
    if pid == 0 {
        return Ok(());
    }
    imp::terminate(pid, mode)
}

/// PIDs of processes listening on a TCP port.
pub fn find_processes_on_port(port: u16) -> Vec<u32> {
    imp::find_processes_on_port(port)
}

/// Full command line of a process, if the platform exposes it.
pub fn process_command_line(pid: u32) -> Option<String> {
    imp::process_command_line(pid)
}

/// Full argument list of a process. `None` where the platform only exposes
/// the image name.
pub fn process_arguments(pid: u32) -> Option<String> {
    if imp::FULL_COMMAND_LINE {
        process_command_line(pid)
    } else {
        None
    }
}

/// Opaque OS start time of a process. Equal values for the same PID mean
/// the same process; a reused PID reports a different value.
pub fn process_start_time(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }
    imp::process_start_time(pid)
}

/// Identify which process owns a given TCP port.
pub fn identify_port_owner(port: u16) -> Option<String> {
    let pid = find_processes_on_port(port).into_iter().next()?;
    match process_command_line(pid) {
        Some(cmd) if cmd.is_empty() => Some(format!("PID {}", pid)),
        Some(cmd) if cmd.chars().count() > 60 => {
            let short: String = cmd.chars().take(57).collect();
            Some(format!("{}... (PID {})", short, pid))
        }
        Some(cmd) => Some(format!("{} (PID {})", cmd, pid)),
        None => Some(format!("PID {}", pid)),
    }
}

/// Candidate locations for `tool`, most specific first. Entries may not exist.
pub fn executable_search_paths(tool: &str) -> Vec<PathBuf> {
    let file_name = if EXE_SUFFIX.is_empty() || tool.ends_with(EXE_SUFFIX) {
        tool.to_string()
    } else {
        format!("{}{}", tool, EXE_SUFFIX)
    };

    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default();
    for extra in imp::extra_search_dirs() {
        if !dirs.contains(&extra) {
            dirs.push(extra);
        }
    }
    dirs.into_iter().map(|dir| dir.join(&file_name)).collect()
}

/// First existing executable for `tool` on the search paths.
pub fn find_executable(tool: &str) -> Option<PathBuf> {
    executable_search_paths(tool)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Home directory of the user who invoked us.
///
/// Under `sudo` the effective account is root, but state must land in the
/// invoking user's home, so `SUDO_USER` takes precedence when elevated.
pub fn resolve_home_dir() -> Option<PathBuf> {
    imp::elevated_user_home().or_else(dirs::home_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_key_matches_consts() {
        let info = PlatformInfo::detect();
        assert_eq!(
            info.key(),
            format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
        );
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!is_process_alive(0));
        assert!(terminate(0, TerminateMode::Forceful).is_ok());
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn start_time_is_stable_for_a_live_process() {
        let pid = std::process::id();
        let first = process_start_time(pid);
        assert!(first.is_some());
        assert_eq!(process_start_time(pid), first);
        assert_eq!(process_start_time(i32::MAX as u32), None);
    }

    #[test]
    fn terminate_missing_process_is_idempotent() {
        // Above the Linux pid_max ceiling, so no such process can exist.
        let pid = i32::MAX as u32;
        assert!(!is_process_alive(pid));
        assert!(terminate(pid, TerminateMode::Forceful).is_ok());
        assert!(terminate(pid, TerminateMode::Graceful(GracefulSignal::Term)).is_ok());
    }

    #[test]
    fn search_paths_end_with_tool_name() {
        let paths = executable_search_paths("postgres");
        assert!(!paths.is_empty());
        let expected = format!("postgres{}", EXE_SUFFIX);
        assert!(paths
            .iter()
            .all(|p| p.file_name().unwrap().to_string_lossy() == expected));
    }

    #[test]
    fn home_dir_resolves() {
        assert!(resolve_home_dir().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn finds_listener_on_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let pids = find_processes_on_port(port);
        if cfg!(target_os = "linux") {
            assert!(pids.contains(&std::process::id()), "got {:?}", pids);
        }
        drop(listener);
    }
}
