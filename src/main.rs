use clap::{CommandFactory, Parser};
use clap_complete::aot::generate;
use dbrig::cli::{Cli, Commands};
use dbrig::commands;
use dbrig::config::resolve::{resolve_data_root, Layout};
use dbrig::error::ContainerError;
use dbrig::orchestrator::ContainerManager;
use dbrig::update;
use miette::Diagnostic;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The CLI prints its own results; logs stay quiet unless asked for.
    let default_filter = if cli.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        if let Some(help) = e.downcast_ref::<ContainerError>().and_then(|ce| ce.help()) {
            eprintln!("  help: {}", help);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "dbrig", &mut std::io::stdout());
        return Ok(());
    }

    let root = match cli.global.home {
        Some(home) => home,
        None => resolve_data_root()?,
    };
    let manager = ContainerManager::open(Layout::new(root))?;
    let update_check = manager.spawn_update_check();

    let result = match cli.command {
        Commands::Create {
            name,
            engine,
            db_version,
            port,
        } => commands::create::run(&manager, &name, &engine, db_version.as_deref(), port).await,
        Commands::Start { name } => commands::start::run(&manager, &name).await,
        Commands::Stop { name, all } => commands::stop::run(&manager, name.as_deref(), all).await,
        Commands::Status { name } => commands::status::run(&manager, &name),
        Commands::List { json } => commands::list::run(&manager, json),
        Commands::Rename { old, new } => commands::rename::run(&manager, &old, &new),
        Commands::Clone { source, target } => commands::clone::run(&manager, &source, &target),
        Commands::Delete { name, force } => commands::delete::run(&manager, &name, force).await,
        Commands::Url { name } => commands::url::run(&manager, &name),
        Commands::Engines => commands::engines::run(),
        Commands::Doctor => commands::doctor::run(&manager).await,
        Commands::Completions { .. } => Ok(()),
    };

    if let Some(handle) = update_check {
        if let Some(notice) = update::finished_notice(handle).await {
            eprintln!("{}", notice);
        }
    }
    result
}
