//! Locating engine binaries.
//!
//! Downloading and unpacking releases is left to external tooling; the
//! [`LocalProvisioner`] only finds binaries that are already present, either
//! in a managed install under `<data root>/bin` or on the executable search
//! paths.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::engine::Engine;
use crate::error::{ContainerError, Result};
use crate::platform::{self, PlatformInfo};

#[async_trait]
pub trait BinaryProvisioner: Send + Sync {
    /// Directory holding the engine's executables for `version`.
    async fn ensure_installed(
        &self,
        engine: Engine,
        version: &str,
        platform: &PlatformInfo,
    ) -> Result<PathBuf>;

    /// Concrete version for a requested one (`None` or `"latest"` means the
    /// configured or built-in default).
    fn resolve_version(&self, engine: Engine, requested: Option<&str>) -> String;
}

pub struct LocalProvisioner {
    install_root: PathBuf,
    bin_dirs: BTreeMap<Engine, PathBuf>,
    versions: BTreeMap<Engine, String>,
}

impl LocalProvisioner {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            bin_dirs: BTreeMap::new(),
            versions: BTreeMap::new(),
        }
    }

    /// Explicit binary directory for one engine, checked before the search
    /// paths.
    pub fn with_bin_dir(mut self, engine: Engine, dir: impl Into<PathBuf>) -> Self {
        self.bin_dirs.insert(engine, dir.into());
        self
    }

    pub fn with_version(mut self, engine: Engine, version: impl Into<String>) -> Self {
        self.versions.insert(engine, version.into());
        self
    }

    /// Where a managed install of this engine build would live.
    pub fn managed_dir(&self, engine: Engine, version: &str, platform: &PlatformInfo) -> PathBuf {
        self.install_root
            .join(format!("{}-{}-{}", engine, version, platform.key()))
    }

    fn contains_binary(dir: &Path, engine: Engine, platform: &PlatformInfo) -> bool {
        dir.join(format!("{}{}", engine.profile().binary, platform.exe_suffix))
            .is_file()
    }

    /// First directory containing the engine's main binary.
    pub fn locate(&self, engine: Engine, version: &str, platform: &PlatformInfo) -> Option<PathBuf> {
        let managed = self.managed_dir(engine, version, platform);
        let mut candidates = vec![managed.join("bin"), managed];
        if let Some(dir) = self.bin_dirs.get(&engine) {
            candidates.push(dir.clone());
        }
        if let Some(found) = candidates
            .into_iter()
            .find(|dir| Self::contains_binary(dir, engine, platform))
        {
            return Some(found);
        }
        platform::find_executable(engine.profile().binary)
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
    }
}

#[async_trait]
impl BinaryProvisioner for LocalProvisioner {
    async fn ensure_installed(
        &self,
        engine: Engine,
        version: &str,
        platform: &PlatformInfo,
    ) -> Result<PathBuf> {
        match self.locate(engine, version, platform) {
            Some(dir) => {
                debug!(%engine, version, dir = %dir.display(), "binaries located");
                Ok(dir)
            }
            None => Err(ContainerError::BinaryNotInstalled {
                engine,
                binary: engine.profile().binary.to_string(),
            }),
        }
    }

    fn resolve_version(&self, engine: Engine, requested: Option<&str>) -> String {
        match requested {
            Some(v) if !v.is_empty() && v != "latest" => v.to_string(),
            _ => self
                .versions
                .get(&engine)
                .cloned()
                .unwrap_or_else(|| engine.profile().default_version.to_string()),
        }
    }
}
