use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::engine::Engine;

/// Why a spawn did not reach the detached state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnFailure {
    MissingExecutable { program: PathBuf },
    Timeout { after: Duration },
    EarlyExit { code: Option<i32> },
    Io { message: String },
}

impl std::fmt::Display for SpawnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnFailure::MissingExecutable { program } => {
                write!(f, "executable not found: {}", program.display())
            }
            SpawnFailure::Timeout { after } => {
                write!(f, "process was not confirmed within {:?}", after)
            }
            SpawnFailure::EarlyExit { code: Some(code) } => {
                write!(f, "process exited during startup with code {}", code)
            }
            SpawnFailure::EarlyExit { code: None } => {
                write!(f, "process exited during startup")
            }
            SpawnFailure::Io { message } => write!(f, "{}", message),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ContainerError {
    #[error("port {port} is unavailable{}", owner.as_ref().map(|o| format!(" (in use by {})", o)).unwrap_or_default())]
    #[diagnostic(
        code(dbrig::port_unavailable),
        help("free port {port} or choose another with `dbrig create --port`")
    )]
    PortUnavailable { port: u16, owner: Option<String> },

    #[error("failed to start '{container}': {reason} (log: {})", log_path.display())]
    #[diagnostic(code(dbrig::spawn_failed), help("check the server log, then retry `dbrig start {container}`"))]
    SpawnFailed {
        container: String,
        reason: SpawnFailure,
        log_path: PathBuf,
    },

    #[error("'{container}' started as PID {pid} but {} could not be written: {source}", pid_path.display())]
    #[diagnostic(
        code(dbrig::pid_persist_failed),
        help("the process was killed; check permissions on the container directory")
    )]
    PidPersistFailed {
        container: String,
        pid: u32,
        pid_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{container}' did not become ready within {timeout:?} (log: {})", log_path.display())]
    #[diagnostic(
        code(dbrig::readiness_timeout),
        help("inspect the server log and retry with `dbrig start {container}`")
    )]
    ReadinessTimeout {
        container: String,
        timeout: Duration,
        log_path: PathBuf,
    },

    #[error("could not terminate PID {pid} of '{container}'")]
    #[diagnostic(
        code(dbrig::termination_failed),
        help("kill PID {pid} manually, then run `dbrig stop {container}` again")
    )]
    TerminationFailed { container: String, pid: u32 },

    #[error("container '{name}' not found{}", suggestion.as_ref().map(|s| format!(" (did you mean `{}`?)", s)).unwrap_or_default())]
    #[diagnostic(code(dbrig::not_found), help("run `dbrig list` to see existing containers"))]
    NotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown engine '{name}'{}", suggestion.as_ref().map(|s| format!(" (did you mean `{}`?)", s)).unwrap_or_default())]
    #[diagnostic(code(dbrig::unknown_engine), help("run `dbrig engines` to see supported engines"))]
    UnknownEngine {
        name: String,
        suggestion: Option<String>,
    },

    #[error("container '{name}' already exists")]
    #[diagnostic(code(dbrig::already_exists), help("pick another name or `dbrig delete {name}` first"))]
    AlreadyExists { name: String },

    #[error("invalid container name '{name}'")]
    #[diagnostic(
        code(dbrig::invalid_name),
        help("names start with a letter and contain only letters, digits, '-' and '_' (max 63)")
    )]
    InvalidName { name: String },

    #[error("container '{name}' is running")]
    #[diagnostic(code(dbrig::not_stopped), help("run `dbrig stop {name}` first"))]
    NotStopped { name: String },

    #[error("{engine} binary '{binary}' is not installed")]
    #[diagnostic(
        code(dbrig::binary_missing),
        help("install {engine} or set `bin_dir` under [engines.{engine}] in config.toml")
    )]
    BinaryNotInstalled { engine: Engine, binary: String },

    #[error("initializing data directory for '{container}' failed: {message} (log: {})", log_path.display())]
    #[diagnostic(code(dbrig::init_failed), help("check the init output in the log, then create the container again"))]
    InitFailed {
        container: String,
        message: String,
        log_path: PathBuf,
    },

    #[error("container record at {} is unreadable: {message}", path.display())]
    #[diagnostic(code(dbrig::corrupt_record))]
    Corrupt { path: PathBuf, message: String },

    #[error(transparent)]
    #[diagnostic(code(dbrig::io))]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

/// Minimum Jaro-Winkler score to offer a name as a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Find the closest candidate to `name` using Jaro-Winkler similarity.
pub fn closest_match<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::jaro_winkler(name, candidate);
        if score >= SUGGESTION_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(name, _)| name.to_string())
}
