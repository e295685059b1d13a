use anyhow::{Context, Result};

use crate::orchestrator::ContainerManager;

pub async fn run(manager: &ContainerManager, name: &str, force: bool) -> Result<()> {
    manager
        .delete(name, force)
        .await
        .with_context(|| format!("deleting '{}'", name))?;
    println!("Deleted {}", name);
    Ok(())
}
