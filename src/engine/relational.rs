use super::{AdapterContext, Engine, EngineAdapter};
use crate::orchestrator::ready::Probe;
use crate::orchestrator::supervisor::{SpawnSpec, StopProcedure};
use crate::platform::GracefulSignal;

pub struct Postgres;

impl EngineAdapter for Postgres {
    fn engine(&self) -> Engine {
        Engine::Postgresql
    }

    fn init_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        Some(SpawnSpec::new(ctx.bin("initdb")).args([
            "-D".to_string(),
            ctx.data_dir(),
            "-U".to_string(),
            "postgres".to_string(),
            "--auth=trust".to_string(),
            "--encoding=UTF8".to_string(),
            "--no-instructions".to_string(),
        ]))
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        let mut spec = SpawnSpec::new(ctx.bin("postgres")).args([
            "-D".to_string(),
            ctx.data_dir(),
            "-p".to_string(),
            ctx.port.to_string(),
            "-c".to_string(),
            "listen_addresses=127.0.0.1".to_string(),
        ]);
        if cfg!(unix) {
            // Keep the socket out of /var/run/postgresql, which is usually root-owned.
            spec = spec
                .arg("-c")
                .arg(format!("unix_socket_directories={}", ctx.data_dir()));
        }
        Some(spec)
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        let pg_isready = ctx.bin("pg_isready");
        if pg_isready.is_file() {
            Probe::command(SpawnSpec::new(pg_isready).args([
                "-h".to_string(),
                "127.0.0.1".to_string(),
                "-p".to_string(),
                ctx.port.to_string(),
                "-q".to_string(),
            ]))
        } else {
            Probe::Tcp { port: ctx.port }
        }
    }

    fn stop_procedure(&self, ctx: &AdapterContext<'_>) -> StopProcedure {
        // SIGINT is PostgreSQL's "fast" shutdown; SIGTERM waits for clients.
        StopProcedure::signal(GracefulSignal::Interrupt, ctx.grace)
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!("postgresql://postgres@127.0.0.1:{}/postgres", ctx.port)
    }
}

/// MySQL and MariaDB share a wire protocol and tooling layout.
pub struct MySql {
    engine: Engine,
    admin: &'static str,
}

impl MySql {
    pub fn mysql() -> Self {
        Self {
            engine: Engine::Mysql,
            admin: "mysqladmin",
        }
    }

    pub fn mariadb() -> Self {
        Self {
            engine: Engine::Mariadb,
            admin: "mariadb-admin",
        }
    }

    fn admin(&self, ctx: &AdapterContext<'_>, command: &str) -> SpawnSpec {
        SpawnSpec::new(ctx.bin(self.admin)).args([
            "-h".to_string(),
            "127.0.0.1".to_string(),
            "-P".to_string(),
            ctx.port.to_string(),
            "-u".to_string(),
            "root".to_string(),
            command.to_string(),
        ])
    }
}

impl EngineAdapter for MySql {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn init_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        let datadir = format!("--datadir={}", ctx.data_dir());
        let spec = match self.engine {
            Engine::Mariadb => SpawnSpec::new(ctx.bin("mariadb-install-db")).args([
                datadir,
                "--auth-root-authentication-method=normal".to_string(),
                "--skip-test-db".to_string(),
            ]),
            _ => SpawnSpec::new(ctx.bin(self.engine.profile().binary))
                .args(["--initialize-insecure".to_string(), datadir]),
        };
        Some(spec)
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        let dir = ctx.paths.dir.to_string_lossy();
        let mut spec = SpawnSpec::new(ctx.bin(self.engine.profile().binary)).args([
            format!("--datadir={}", ctx.data_dir()),
            format!("--port={}", ctx.port),
            "--bind-address=127.0.0.1".to_string(),
            format!("--socket={}/mysqld.sock", dir),
            format!("--pid-file={}/mysqld.pid", dir),
        ]);
        if self.engine == Engine::Mysql {
            spec = spec.arg("--mysqlx=OFF");
        }
        Some(spec)
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        Probe::command(self.admin(ctx, "ping"))
    }

    fn stop_procedure(&self, ctx: &AdapterContext<'_>) -> StopProcedure {
        StopProcedure::command(self.admin(ctx, "shutdown"), ctx.grace)
            .then_signal(GracefulSignal::Term, ctx.grace)
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!("mysql://root@127.0.0.1:{}/", ctx.port)
    }
}

pub struct Cockroach;

impl EngineAdapter for Cockroach {
    fn engine(&self) -> Engine {
        Engine::Cockroachdb
    }

    fn spawn_spec(&self, ctx: &AdapterContext<'_>) -> Option<SpawnSpec> {
        Some(SpawnSpec::new(ctx.bin("cockroach")).args([
            "start-single-node".to_string(),
            "--insecure".to_string(),
            format!("--listen-addr=127.0.0.1:{}", ctx.port),
            format!("--http-addr=127.0.0.1:{}", ctx.secondary_port("http")),
            format!("--store={}", ctx.data_dir()),
        ]))
    }

    fn readiness_probe(&self, ctx: &AdapterContext<'_>) -> Probe {
        Probe::http(format!(
            "http://127.0.0.1:{}/health?ready=1",
            ctx.secondary_port("http")
        ))
    }

    fn connection_string(&self, ctx: &AdapterContext<'_>) -> String {
        format!(
            "postgresql://root@127.0.0.1:{}/defaultdb?sslmode=disable",
            ctx.port
        )
    }
}
