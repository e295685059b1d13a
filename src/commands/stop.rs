use anyhow::{bail, Context, Result};

use crate::orchestrator::ContainerManager;

pub async fn run(manager: &ContainerManager, name: Option<&str>, all: bool) -> Result<()> {
    if all {
        return run_all(manager).await;
    }
    let Some(name) = name else {
        bail!("specify a container name or --all");
    };
    let stopped = manager
        .stop(name)
        .await
        .with_context(|| format!("stopping '{}'", name))?;
    if stopped {
        println!("Stopped {}", name);
    } else {
        println!("{} is not running", name);
    }
    Ok(())
}

async fn run_all(manager: &ContainerManager) -> Result<()> {
    let results = manager.stop_all().await?;
    if results.is_empty() {
        println!("No running containers.");
        return Ok(());
    }

    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(_) => println!("Stopped {}", name),
            Err(e) => {
                eprintln!("Failed to stop {}: {}", name, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} containers failed to stop", failed, results.len());
    }
    Ok(())
}
