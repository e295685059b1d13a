use std::path::PathBuf;

use super::{AdapterContext, Engine, EngineAdapter};
use crate::orchestrator::ready::Probe;
use crate::orchestrator::supervisor::SpawnSpec;

/// File-based engines. There is no process: "running" means the database
/// file is registered and reachable.
pub struct FileEngine {
    engine: Engine,
    extension: &'static str,
    scheme: &'static str,
    /// SQLite accepts a zero-length file as an empty database; DuckDB does
    /// not, so its file is left for the client to create.
    touch_on_prepare: bool,
}

impl FileEngine {
    pub fn sqlite() -> Self {
        Self {
            engine: Engine::Sqlite,
            extension: "sqlite",
            scheme: "sqlite",
            touch_on_prepare: true,
        }
    }

    pub fn duckdb() -> Self {
        Self {
            engine: Engine::Duckdb,
            extension: "duckdb",
            scheme: "duckdb",
            touch_on_prepare: false,
        }
    }

    pub fn database_file(&self, ctx: &AdapterContext<'_>) -> PathBuf {
        ctx.paths
            .data
            .join(format!("{}.{}", ctx.container.name, self.extension))
    }
}

impl EngineAdapter for FileEngine {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn spawn_spec(&self, _ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        None
    }

    fn prepare(&self, ctx: &AdapterContext<'_>) -> std::io::Result<()> {
        std::fs::create_dir_all(&ctx.paths.data)?;
        let file = self.database_file(ctx);
        if self.touch_on_prepare && !file.exists() {
            std::fs::File::create(&file)?;
        }
        Ok(())
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        Probe::FileExists {
            path: ctx.paths.data.clone(),
        }
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        let file = self.database_file(ctx);
        format!("{}://{}", self.scheme, file.to_string_lossy().replace('\\', "/"))
    }
}
