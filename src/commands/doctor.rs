use anyhow::Result;

use crate::engine::Engine;
use crate::orchestrator::ContainerManager;

pub async fn run(manager: &ContainerManager) -> Result<()> {
    println!("dbrig doctor");
    println!("============");
    println!();
    println!("  Data root: {}", manager.layout().root().display());
    println!("  Platform:  {}", manager.platform().key());
    println!();

    let mut missing = 0;
    for engine in Engine::ALL {
        let name = engine.as_str();
        if engine.is_embedded() {
            println!("  [ok] {:<12} embedded", name);
            continue;
        }
        match manager.locate_binaries(engine).await {
            Ok(dir) => println!("  [ok] {:<12} {}", name, dir.display()),
            Err(_) => {
                println!("  [!!] {:<12} {} not found", name, engine.profile().binary);
                missing += 1;
            }
        }
    }

    println!();
    if missing == 0 {
        println!("All engine binaries found.");
    } else {
        println!("{} engines have no binary installed.", missing);
        println!(
            "Install them, or point `bin_dir` under [engines.<engine>] in {} at an existing install.",
            manager.layout().config_file().display()
        );
    }
    Ok(())
}
