use anyhow::{Context, Result};

use crate::engine::Engine;
use crate::orchestrator::ContainerManager;

pub async fn run(
    manager: &ContainerManager,
    name: &str,
    engine: &str,
    version: Option<&str>,
    port: Option<u16>,
) -> Result<()> {
    let engine: Engine = engine.parse()?;
    let container = manager
        .create(name, engine, version, port)
        .await
        .with_context(|| format!("creating '{}'", name))?;

    match container.port {
        Some(port) => println!(
            "Created {} ({} {}) on port {}",
            container.name, container.engine, container.version, port
        ),
        None => println!(
            "Created {} ({} {})",
            container.name, container.engine, container.version
        ),
    }
    println!("Run `dbrig start {}` to start it.", container.name);
    Ok(())
}
