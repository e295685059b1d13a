use anyhow::{Context, Result};

use crate::orchestrator::ContainerManager;

pub fn run(manager: &ContainerManager, old: &str, new: &str) -> Result<()> {
    manager
        .rename(old, new)
        .with_context(|| format!("renaming '{}' to '{}'", old, new))?;
    println!("Renamed {} to {}", old, new);
    Ok(())
}
