use anyhow::Result;

use crate::orchestrator::ContainerManager;

pub fn run(manager: &ContainerManager, name: &str) -> Result<()> {
    println!("{}", manager.connection_string(name)?);
    Ok(())
}
