use anyhow::{Context, Result};

use crate::orchestrator::ContainerManager;

pub fn run(manager: &ContainerManager, source: &str, target: &str) -> Result<()> {
    let cloned = manager
        .clone_container(source, target)
        .with_context(|| format!("cloning '{}' to '{}'", source, target))?;
    match cloned.port {
        Some(port) => println!("Cloned {} to {} on port {}", source, target, port),
        None => println!("Cloned {} to {}", source, target),
    }
    Ok(())
}
