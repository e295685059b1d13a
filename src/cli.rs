use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "dbrig",
    version,
    about = "Local database containers as supervised background processes"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Data directory (default: $DBRIG_HOME, then ~/.dbrig)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a container and initialise its data directory
    Create {
        /// Container name
        name: String,
        /// Engine kind (see `dbrig engines`)
        #[arg(short, long)]
        engine: String,
        /// Engine version (default: configured or built-in)
        #[arg(long = "db-version", value_name = "VERSION")]
        db_version: Option<String>,
        /// Primary port (default: the engine's port, or the next free one)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start a container and wait until it accepts connections
    Start {
        /// Container name
        name: String,
    },
    /// Stop a running container
    Stop {
        /// Container name
        #[arg(required_unless_present = "all")]
        name: Option<String>,
        /// Stop every running container
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
    /// Show whether a container is running
    Status {
        /// Container name
        name: String,
    },
    /// List all containers
    #[command(alias = "ls")]
    List {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a stopped container
    Rename {
        /// Current name
        old: String,
        /// New name
        new: String,
    },
    /// Copy a stopped container under a new name
    Clone {
        /// Container to copy
        source: String,
        /// Name of the copy
        target: String,
    },
    /// Delete a container and all of its data
    #[command(alias = "rm")]
    Delete {
        /// Container name
        name: String,
        /// Stop the container first if it is running
        #[arg(short, long)]
        force: bool,
    },
    /// Print a container's connection string
    Url {
        /// Container name
        name: String,
    },
    /// List supported engines
    Engines,
    /// Check which engine binaries are installed
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
