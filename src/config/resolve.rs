use anyhow::Context;
use std::path::{Path, PathBuf};

/// Environment variable that relocates the whole data root.
pub const HOME_ENV: &str = "DBRIG_HOME";

const DEFAULT_DIR: &str = ".dbrig";

/// Resolve the data root: `$DBRIG_HOME` when set, otherwise `.dbrig` under
/// the invoking user's home directory.
pub fn resolve_data_root() -> anyhow::Result<PathBuf> {
    data_root_from(
        std::env::var_os(HOME_ENV).map(PathBuf::from),
        crate::platform::resolve_home_dir(),
    )
}

fn data_root_from(explicit: Option<PathBuf>, home: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(root) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(root);
    }
    let home = home.context("could not determine the home directory; set DBRIG_HOME")?;
    Ok(home.join(DEFAULT_DIR))
}

/// Fixed layout under the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn containers(&self) -> PathBuf {
        self.root.join("containers")
    }

    /// Managed binary installs, one directory per engine/version/platform.
    pub fn binaries(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn update_cache(&self) -> PathBuf {
        self.root.join("update-check.json")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
