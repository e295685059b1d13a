use super::{AdapterContext, Engine, EngineAdapter};
use crate::orchestrator::ready::Probe;
use crate::orchestrator::supervisor::SpawnSpec;

pub struct Qdrant;

impl EngineAdapter for Qdrant {
    fn engine(&self) -> Engine {
        Engine::Qdrant
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        Some(
            SpawnSpec::new(ctx.bin("qdrant"))
                .arg("--disable-telemetry")
                .env("QDRANT__SERVICE__HOST", "127.0.0.1")
                .env("QDRANT__SERVICE__HTTP_PORT", ctx.port.to_string())
                .env(
                    "QDRANT__SERVICE__GRPC_PORT",
                    ctx.secondary_port("grpc").to_string(),
                )
                .env("QDRANT__STORAGE__STORAGE_PATH", ctx.data_dir())
                .env(
                    "QDRANT__STORAGE__SNAPSHOTS_PATH",
                    format!("{}/snapshots", ctx.data_dir()),
                )
                .current_dir(&ctx.paths.dir),
        )
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        Probe::http(format!("http://127.0.0.1:{}/healthz", ctx.port))
    }

    fn args_name_container(&self) -> bool {
        false
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!("http://127.0.0.1:{}", ctx.port)
    }
}

pub struct Meilisearch;

impl EngineAdapter for Meilisearch {
    fn engine(&self) -> Engine {
        Engine::Meilisearch
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        Some(SpawnSpec::new(ctx.bin("meilisearch")).args([
            "--http-addr".to_string(),
            format!("127.0.0.1:{}", ctx.port),
            "--db-path".to_string(),
            ctx.data_dir(),
            "--env".to_string(),
            "development".to_string(),
            "--no-analytics".to_string(),
        ]))
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        Probe::http(format!("http://127.0.0.1:{}/health", ctx.port))
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!("http://127.0.0.1:{}", ctx.port)
    }
}

pub struct Weaviate;

impl EngineAdapter for Weaviate {
    fn engine(&self) -> Engine {
        Engine::Weaviate
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        Some(
            SpawnSpec::new(ctx.bin("weaviate"))
                .args([
                    "--host".to_string(),
                    "127.0.0.1".to_string(),
                    "--port".to_string(),
                    ctx.port.to_string(),
                    "--scheme".to_string(),
                    "http".to_string(),
                ])
                .env("PERSISTENCE_DATA_PATH", ctx.data_dir())
                .env("GRPC_PORT", ctx.secondary_port("grpc").to_string())
                .env("AUTHENTICATION_ANONYMOUS_ACCESS_ENABLED", "true")
                .env("DEFAULT_VECTORIZER_MODULE", "none")
                .env("CLUSTER_HOSTNAME", "node1"),
        )
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        Probe::http(format!(
            "http://127.0.0.1:{}/v1/.well-known/ready",
            ctx.port
        ))
    }

    fn args_name_container(&self) -> bool {
        false
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!("http://127.0.0.1:{}", ctx.port)
    }
}
