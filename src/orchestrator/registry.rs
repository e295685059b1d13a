use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::ports::{derive_secondary_ports, PortAllocator};
use super::state::{PidState, ProcessRecord};
use crate::engine::Engine;
use crate::error::{closest_match, ContainerError, Result};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

const MAX_NAME_LEN: usize = 63;
const RECORD_FILE: &str = "container.json";
const LOCK_FILE: &str = ".registry.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
        })
    }
}

/// One managed database instance as persisted in `container.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub engine: Engine,
    pub version: String,
    /// `None` for embedded engines.
    pub port: Option<u16>,
    #[serde(default)]
    pub secondary_ports: Vec<u16>,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloned_from: Option<String>,
    /// Binary directory bound at creation, when it did not come from the
    /// default search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<PathBuf>,
}

impl Container {
    /// Primary port followed by all secondaries.
    pub fn all_ports(&self) -> Vec<u16> {
        self.port
            .into_iter()
            .chain(self.secondary_ports.iter().copied())
            .collect()
    }

    /// Recompute secondaries from the primary port.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        self.secondary_ports = derive_secondary_ports(port, self.engine.profile().offsets)?;
        self.port = Some(port);
        Ok(())
    }
}

/// On-disk locations of one container, derived from engine and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPaths {
    pub dir: PathBuf,
    pub data: PathBuf,
    pub log: PathBuf,
    pub pid: PathBuf,
    pub record: PathBuf,
}

impl ContainerPaths {
    pub fn new(root: &Path, engine: Engine, name: &str) -> Self {
        let dir = root.join(engine.as_str()).join(name);
        Self {
            data: dir.join("data"),
            log: dir.join(format!("{}.log", engine)),
            pid: dir.join(format!("{}.pid", engine)),
            record: dir.join(RECORD_FILE),
            dir,
        }
    }

    fn backup(&self) -> PathBuf {
        self.record.with_extension("json.bak")
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN || !NAME_RE.is_match(name) {
        return Err(ContainerError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// File-backed store of container records under `<root>/<engine>/<name>/`.
pub struct ContainerRegistry {
    root: PathBuf,
}

impl ContainerRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, container: &Container) -> ContainerPaths {
        ContainerPaths::new(&self.root, container.engine, &container.name)
    }

    /// Acquire an exclusive advisory lock over the registry.
    /// Returns the lock file handle (lock released on drop).
    fn lock(&self) -> Option<File> {
        std::fs::create_dir_all(&self.root).ok()?;
        let lock_file = File::create(self.root.join(LOCK_FILE)).ok()?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: fd is valid for the lifetime of lock_file
            unsafe {
                libc::flock(lock_file.as_raw_fd(), libc::LOCK_EX);
            }
        }

        Some(lock_file)
    }

    fn read_record(path: &Path) -> Result<Container> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ContainerError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn write_record(&self, container: &Container) -> Result<()> {
        let paths = self.paths(container);
        std::fs::create_dir_all(&paths.dir)?;
        let content = serde_json::to_string_pretty(container)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp_path = paths.record.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &paths.record)?;
        Ok(())
    }

    /// Every record directory, engine by engine.
    fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let mut records = Vec::new();
        for engine in Engine::ALL {
            let engine_dir = self.root.join(engine.as_str());
            let entries = match std::fs::read_dir(&engine_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let record = entry?.path().join(RECORD_FILE);
                if record.is_file() {
                    records.push(record);
                }
            }
        }
        records.sort();
        Ok(records)
    }

    /// All readable records. Corrupt ones are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Container>> {
        let mut containers = Vec::new();
        for path in self.record_paths()? {
            match Self::read_record(&path) {
                Ok(c) => containers.push(c),
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    pub fn find(&self, name: &str) -> Result<Option<Container>> {
        for engine in Engine::ALL {
            let record = ContainerPaths::new(&self.root, engine, name).record;
            if record.is_file() {
                return Self::read_record(&record).map(Some);
            }
        }
        Ok(None)
    }

    pub fn get(&self, name: &str) -> Result<Container> {
        match self.find(name)? {
            Some(c) => Ok(c),
            None => Err(self.not_found(name)),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        Engine::ALL
            .iter()
            .any(|e| ContainerPaths::new(&self.root, *e, name).record.is_file())
    }

    fn not_found(&self, name: &str) -> ContainerError {
        let names: Vec<String> = self
            .list()
            .map(|l| l.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        ContainerError::NotFound {
            name: name.to_string(),
            suggestion: closest_match(name, names.iter().map(String::as_str)),
        }
    }

    /// Persist a new record. Fails if the name is taken under any engine.
    pub fn insert(&self, container: &Container) -> Result<()> {
        validate_name(&container.name)?;
        let _lock = self.lock();
        if self.exists(&container.name) {
            return Err(ContainerError::AlreadyExists {
                name: container.name.clone(),
            });
        }
        self.write_record(container)
    }

    /// Overwrite an existing record.
    pub fn save(&self, container: &Container) -> Result<()> {
        let _lock = self.lock();
        self.write_record(container)
    }

    /// Locked read-modify-write of one record.
    pub fn update<F>(&self, name: &str, mutate: F) -> Result<Container>
    where
        F: FnOnce(&mut Container),
    {
        let _lock = self.lock();
        let mut container = self.get(name)?;
        mutate(&mut container);
        self.write_record(&container)?;
        Ok(container)
    }

    /// Ports claimed by every container other than `except`.
    pub fn reserved_ports(&self, except: Option<&str>) -> Result<HashSet<u16>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| Some(c.name.as_str()) != except)
            .flat_map(|c| c.all_ports())
            .collect())
    }

    fn ensure_stopped(&self, container: &Container) -> Result<()> {
        let live = matches!(
            ProcessRecord::inspect(&self.paths(container).pid),
            PidState::Alive(_)
        );
        if live || container.status == ContainerStatus::Running {
            return Err(ContainerError::NotStopped {
                name: container.name.clone(),
            });
        }
        Ok(())
    }

    fn ensure_free_name(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.exists(name) {
            return Err(ContainerError::AlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Move a stopped container to a new name. The previous record is backed
    /// up first; any failure leaves the container readable under `old`.
    pub fn rename(&self, old: &str, new: &str) -> Result<Container> {
        let _lock = self.lock();
        let container = self.get(old)?;
        self.ensure_stopped(&container)?;
        self.ensure_free_name(new)?;

        let old_paths = self.paths(&container);
        let backup = old_paths.backup();
        std::fs::copy(&old_paths.record, &backup)?;

        let mut renamed = container.clone();
        renamed.name = new.to_string();
        let new_paths = self.paths(&renamed);

        if let Some(parent) = new_paths.dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = std::fs::rename(&old_paths.dir, &new_paths.dir) {
            let _ = std::fs::remove_file(&backup);
            return Err(e.into());
        }

        let result = rename_named_files(&new_paths.data, old, new)
            .map_err(ContainerError::from)
            .and_then(|()| self.write_record(&renamed));
        if let Err(e) = result {
            warn!(from = old, to = new, "rename failed, restoring: {}", e);
            let _ = rename_named_files(&new_paths.data, new, old);
            let _ = std::fs::rename(&new_paths.dir, &old_paths.dir);
            let _ = std::fs::rename(&backup, &old_paths.record);
            return Err(e);
        }

        let _ = std::fs::remove_file(new_paths.backup());
        debug!(from = old, to = new, "container renamed");
        Ok(renamed)
    }

    /// Copy a stopped container's on-disk state under a new name with a
    /// freshly allocated port.
    pub fn clone_container(
        &self,
        source: &str,
        target: &str,
        allocator: &PortAllocator,
    ) -> Result<Container> {
        let _lock = self.lock();
        let original = self.get(source)?;
        self.ensure_stopped(&original)?;
        self.ensure_free_name(target)?;

        let mut cloned = Container {
            name: target.to_string(),
            status: ContainerStatus::Created,
            created_at: Utc::now(),
            cloned_from: Some(original.name.clone()),
            ..original.clone()
        };
        if let Some(port) = original.port {
            let assignment = allocator.find_available_port(port, original.engine.profile().offsets)?;
            cloned.set_port(assignment.port)?;
        }

        let from = self.paths(&original);
        let to = self.paths(&cloned);
        let result = copy_dir(&from.dir, &to.dir, &|p| is_runtime_file(p, &from))
            .and_then(|()| rename_named_files(&to.data, source, target))
            .map_err(ContainerError::from)
            .and_then(|()| self.write_record(&cloned));
        if let Err(e) = result {
            let _ = std::fs::remove_dir_all(&to.dir);
            return Err(e);
        }
        debug!(from = source, to = target, port = ?cloned.port, "container cloned");
        Ok(cloned)
    }

    /// Remove the record and every file under the container directory.
    pub fn remove(&self, name: &str) -> Result<()> {
        let _lock = self.lock();
        let container = self.get(name)?;
        let paths = self.paths(&container);
        match std::fs::remove_dir_all(&paths.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(engine_dir) = paths.dir.parent() {
            // Only succeeds once the last container of this engine is gone
            let _ = std::fs::remove_dir(engine_dir);
        }
        Ok(())
    }
}

/// PID/log/socket files that belong to a running server, not to its data.
fn is_runtime_file(path: &Path, paths: &ContainerPaths) -> bool {
    if path == paths.pid || path == paths.log || path == paths.record || path == paths.backup() {
        return true;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("pid" | "sock" | "lock" | "tmp")
    )
}

fn copy_dir(from: &Path, to: &Path, skip: &dyn Fn(&Path) -> bool) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        if skip(&path) {
            continue;
        }
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&path, &dest, skip)?;
        } else {
            std::fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}

/// Embedded engines name their database file after the container.
fn rename_named_files(data: &Path, old: &str, new: &str) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(data) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.file_stem().and_then(|s| s.to_str()) != Some(old) {
            continue;
        }
        let mut target = data.join(new);
        if let Some(ext) = path.extension() {
            target.set_extension(ext);
        }
        std::fs::rename(&path, &target)?;
    }
    Ok(())
}
