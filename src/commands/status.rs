use anyhow::Result;

use crate::orchestrator::ContainerManager;
use crate::ui::summary::print_status;

pub fn run(manager: &ContainerManager, name: &str) -> Result<()> {
    let state = manager.status(name)?;
    print_status(&state);
    Ok(())
}
