use anyhow::{Context, Result};

use crate::orchestrator::ContainerManager;
use crate::ui::summary::print_started;

pub async fn run(manager: &ContainerManager, name: &str) -> Result<()> {
    let outcome = manager
        .start(name)
        .await
        .with_context(|| format!("starting '{}'", name))?;
    print_started(&outcome);
    Ok(())
}
