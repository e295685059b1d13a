//! Engine kinds and the adapter contract the supervisor is generic over.
//!
//! Each engine is a closed [`Engine`] variant with a static [`EngineProfile`]
//! (ports, grace periods, binary name) and an [`EngineAdapter`] supplying the
//! spawn command, readiness probe and shutdown procedure. Adapters are looked
//! up through an [`AdapterTable`]; nothing outside this module matches on the
//! engine to decide how to run it.

mod analytics;
mod document;
mod embedded;
mod keyvalue;
pub mod profile;
mod relational;
mod search;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{closest_match, ContainerError};
use crate::orchestrator::ready::Probe;
use crate::orchestrator::registry::{Container, ContainerPaths};
use crate::orchestrator::supervisor::{SpawnSpec, StopProcedure};
use crate::platform::{GracefulSignal, EXE_SUFFIX};

pub use profile::{profile, EngineProfile, PortOffset, ProcessModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgresql,
    Mysql,
    Mariadb,
    Cockroachdb,
    Mongodb,
    Redis,
    Valkey,
    Couchdb,
    Surrealdb,
    Typedb,
    Clickhouse,
    Questdb,
    Influxdb,
    Qdrant,
    Meilisearch,
    Weaviate,
    Sqlite,
    Duckdb,
}

impl Engine {
    pub const ALL: [Engine; 18] = [
        Engine::Postgresql,
        Engine::Mysql,
        Engine::Mariadb,
        Engine::Cockroachdb,
        Engine::Mongodb,
        Engine::Redis,
        Engine::Valkey,
        Engine::Couchdb,
        Engine::Surrealdb,
        Engine::Typedb,
        Engine::Clickhouse,
        Engine::Questdb,
        Engine::Influxdb,
        Engine::Qdrant,
        Engine::Meilisearch,
        Engine::Weaviate,
        Engine::Sqlite,
        Engine::Duckdb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgresql => "postgresql",
            Engine::Mysql => "mysql",
            Engine::Mariadb => "mariadb",
            Engine::Cockroachdb => "cockroachdb",
            Engine::Mongodb => "mongodb",
            Engine::Redis => "redis",
            Engine::Valkey => "valkey",
            Engine::Couchdb => "couchdb",
            Engine::Surrealdb => "surrealdb",
            Engine::Typedb => "typedb",
            Engine::Clickhouse => "clickhouse",
            Engine::Questdb => "questdb",
            Engine::Influxdb => "influxdb",
            Engine::Qdrant => "qdrant",
            Engine::Meilisearch => "meilisearch",
            Engine::Weaviate => "weaviate",
            Engine::Sqlite => "sqlite",
            Engine::Duckdb => "duckdb",
        }
    }

    pub fn profile(&self) -> &'static EngineProfile {
        profile(*self)
    }

    pub fn is_embedded(&self) -> bool {
        self.profile().model == ProcessModel::Embedded
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let alias = match lowered.as_str() {
            "postgres" | "pg" => Some(Engine::Postgresql),
            "mongo" => Some(Engine::Mongodb),
            "cockroach" | "crdb" => Some(Engine::Cockroachdb),
            "surreal" => Some(Engine::Surrealdb),
            "influx" => Some(Engine::Influxdb),
            "meili" => Some(Engine::Meilisearch),
            "couch" => Some(Engine::Couchdb),
            "sqlite3" => Some(Engine::Sqlite),
            _ => None,
        };
        if let Some(engine) = alias {
            return Ok(engine);
        }
        Engine::ALL
            .into_iter()
            .find(|e| e.as_str() == lowered)
            .ok_or_else(|| ContainerError::UnknownEngine {
                name: s.to_string(),
                suggestion: closest_match(&lowered, Engine::ALL.iter().map(|e| e.as_str())),
            })
    }
}

/// Everything an adapter needs to describe how to run one container.
pub struct AdapterContext<'a> {
    pub container: &'a Container,
    pub paths: &'a ContainerPaths,
    /// Directory holding the engine's executables.
    pub bin_dir: &'a Path,
    /// Primary port (0 for embedded engines).
    pub port: u16,
    /// Graceful shutdown budget after config overrides. The supervisor
    /// applies platform scaling on top.
    pub grace: Duration,
}

impl AdapterContext<'_> {
    /// Path of an executable shipped alongside the engine.
    pub fn bin(&self, tool: &str) -> PathBuf {
        self.bin_dir.join(format!("{}{}", tool, EXE_SUFFIX))
    }

    /// Secondary port by its profile label.
    pub fn secondary_port(&self, label: &str) -> u16 {
        let offsets = self.container.engine.profile().offsets;
        offsets
            .iter()
            .position(|o| o.label == label)
            .and_then(|idx| self.container.secondary_ports.get(idx).copied())
            .unwrap_or(0)
    }

    pub fn data_dir(&self) -> String {
        self.paths.data.to_string_lossy().into_owned()
    }
}

/// Per-engine plug-in consumed by the supervisor.
pub trait EngineAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    /// Command that runs the server in the foreground. `None` for embedded
    /// engines, which have no process.
    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec>;

    /// One-shot command that initialises an empty data directory.
    fn init_spec(&self, _ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        None
    }

    /// Write any config files the server expects. Runs before every start.
    fn prepare(&self, _ctx: &AdapterContext<'_>) -> std::io::Result<()> {
        Ok(())
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe;

    /// Whether the server's arguments contain a path inside the container
    /// directory, so its PID can be matched to the container by command
    /// line. Servers configured through environment variables return false.
    fn args_name_container(&self) -> bool {
        true
    }

    fn stop_procedure(&self, ctx: &AdapterContext<'_>) -> StopProcedure {
        StopProcedure::signal(GracefulSignal::Term, ctx.grace)
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String;
}

/// Lookup table from engine to adapter.
#[derive(Clone)]
pub struct AdapterTable {
    adapters: BTreeMap<Engine, Arc<dyn EngineAdapter>>,
}

impl AdapterTable {
    pub fn builtin() -> Self {
        let list: Vec<Arc<dyn EngineAdapter>> = vec![
            Arc::new(relational::Postgres),
            Arc::new(relational::MySql::mysql()),
            Arc::new(relational::MySql::mariadb()),
            Arc::new(relational::Cockroach),
            Arc::new(document::Mongo),
            Arc::new(keyvalue::Redis::redis()),
            Arc::new(keyvalue::Redis::valkey()),
            Arc::new(document::Couch),
            Arc::new(document::Surreal),
            Arc::new(document::TypeDb),
            Arc::new(analytics::ClickHouse),
            Arc::new(analytics::QuestDb),
            Arc::new(analytics::Influx),
            Arc::new(search::Qdrant),
            Arc::new(search::Meilisearch),
            Arc::new(search::Weaviate),
            Arc::new(embedded::FileEngine::sqlite()),
            Arc::new(embedded::FileEngine::duckdb()),
        ];
        Self {
            adapters: list.into_iter().map(|a| (a.engine(), a)).collect(),
        }
    }

    /// Replace the adapter for one engine.
    pub fn with_override(mut self, engine: Engine, adapter: Arc<dyn EngineAdapter>) -> Self {
        self.adapters.insert(engine, adapter);
        self
    }

    pub fn get(&self, engine: Engine) -> Arc<dyn EngineAdapter> {
        match self.adapters.get(&engine) {
            Some(adapter) => adapter.clone(),
            // builtin() registers every variant
            None => unreachable!("no adapter registered for {engine}"),
        }
    }
}

impl Default for AdapterTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::Utc;

    use crate::orchestrator::registry::ContainerStatus;

    pub fn container(engine: Engine, port: u16) -> Container {
        let profile = engine.profile();
        Container {
            name: "demo".into(),
            engine,
            version: profile.default_version.into(),
            port: profile.default_port.map(|_| port),
            secondary_ports: crate::orchestrator::ports::derive_secondary_ports(
                port,
                profile.offsets,
            )
            .unwrap_or_default(),
            status: ContainerStatus::Created,
            created_at: Utc::now(),
            cloned_from: None,
            binary_path: None,
        }
    }

    pub fn paths() -> ContainerPaths {
        ContainerPaths::new(Path::new("/data/containers"), Engine::Postgresql, "demo")
    }
}
