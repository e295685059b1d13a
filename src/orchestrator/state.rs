use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::platform;

/// Runtime record of a spawned server, persisted as the container's PID file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub spawned_at: DateTime<Utc>,
    /// Every port the process was started with, primary first.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// OS start time of `pid` when it was recorded. Tells a reused PID apart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
}

/// Result of reading a PID file and probing the process it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidState {
    Missing,
    Alive(ProcessRecord),
    /// The file named a dead process and has been removed.
    Stale { pid: u32 },
}

impl ProcessRecord {
    pub fn new(pid: u32, ports: Vec<u16>) -> Self {
        Self {
            pid,
            spawned_at: Utc::now(),
            ports,
            started: platform::process_start_time(pid),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        // Atomic write: write to tmp file then rename
        let tmp_path = path.with_extension("pid.tmp");
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Parse a PID file. Files holding only a bare integer (as written by
    /// the servers themselves) are accepted too.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        if let Ok(record) = serde_json::from_str::<ProcessRecord>(&content) {
            return Some(record);
        }
        let pid = content.lines().next()?.trim().parse::<u32>().ok()?;
        let spawned_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Some(Self {
            pid,
            spawned_at,
            ports: Vec::new(),
            started: None,
        })
    }

    pub fn remove(path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn is_alive(&self) -> bool {
        platform::is_process_alive(self.pid)
    }

    /// Whether the live process behind `pid` is still the one recorded.
    ///
    /// A recorded start time must match the current one. When `marker` is
    /// given it must also appear in the process arguments; if the arguments
    /// cannot be read, only a matching start time is accepted.
    pub fn is_same_process(&self, marker: Option<&str>) -> bool {
        let current = platform::process_start_time(self.pid);
        let start_verified = match (self.started.as_deref(), current.as_deref()) {
            (Some(recorded), Some(now)) if recorded != now => {
                debug!(pid = self.pid, recorded, now, "pid start time changed");
                return false;
            }
            (Some(_), Some(_)) => true,
            _ => false,
        };
        let Some(marker) = marker else {
            return true;
        };
        match platform::process_arguments(self.pid) {
            Some(cmdline) => cmdline.contains(marker),
            None => start_verified,
        }
    }

    /// Read the PID file and verify the process. Stale files are deleted on
    /// the spot so every reader sees a consistent result.
    pub fn inspect(path: &Path) -> PidState {
        let Some(record) = Self::load(path) else {
            if path.exists() {
                debug!(path = %path.display(), "removing unreadable pid file");
                let _ = Self::remove(path);
            }
            return PidState::Missing;
        };
        if record.is_alive() {
            return PidState::Alive(record);
        }
        debug!(pid = record.pid, path = %path.display(), "removing stale pid file");
        let _ = Self::remove(path);
        PidState::Stale { pid: record.pid }
    }
}
