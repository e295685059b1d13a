use super::{AdapterContext, Engine, EngineAdapter};
use crate::orchestrator::ready::Probe;
use crate::orchestrator::supervisor::SpawnSpec;

/// Redis and its Valkey fork accept the same flags.
pub struct Redis {
    engine: Engine,
    server: &'static str,
    cli: &'static str,
}

impl Redis {
    pub fn redis() -> Self {
        Self {
            engine: Engine::Redis,
            server: "redis-server",
            cli: "redis-cli",
        }
    }

    pub fn valkey() -> Self {
        Self {
            engine: Engine::Valkey,
            server: "valkey-server",
            cli: "valkey-cli",
        }
    }
}

impl EngineAdapter for Redis {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        Some(SpawnSpec::new(ctx.bin(self.server)).args([
            "--port".to_string(),
            ctx.port.to_string(),
            "--bind".to_string(),
            "127.0.0.1".to_string(),
            "--dir".to_string(),
            ctx.data_dir(),
            "--daemonize".to_string(),
            "no".to_string(),
            "--appendonly".to_string(),
            "yes".to_string(),
        ]))
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        let cli = ctx.bin(self.cli);
        if !cli.is_file() {
            return Probe::Tcp { port: ctx.port };
        }
        Probe::command_expecting(
            SpawnSpec::new(cli).args([
                "-h".to_string(),
                "127.0.0.1".to_string(),
                "-p".to_string(),
                ctx.port.to_string(),
                "ping".to_string(),
            ]),
            "PONG",
        )
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!("redis://127.0.0.1:{}", ctx.port)
    }
}
