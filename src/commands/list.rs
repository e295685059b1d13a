use anyhow::Result;

use crate::orchestrator::registry::Container;
use crate::orchestrator::ContainerManager;
use crate::ui::summary::print_containers;

pub fn run(manager: &ContainerManager, json: bool) -> Result<()> {
    let states = manager.list()?;
    if json {
        let containers: Vec<&Container> = states.iter().map(|s| &s.container).collect();
        println!("{}", serde_json::to_string_pretty(&containers)?);
    } else {
        print_containers(&states);
    }
    Ok(())
}
