use std::time::Duration;

use super::Engine;

/// A secondary port, defined as a fixed offset from the primary port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOffset {
    pub label: &'static str,
    pub offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessModel {
    /// A long-running server process supervised by dbrig.
    Server,
    /// A file-based engine with no process to supervise.
    Embedded,
}

/// Built-in, empirically tuned constants for one engine. Every field except
/// `engine`, `binary` and `offsets` can be overridden from `config.toml`.
#[derive(Debug, Clone, Copy)]
pub struct EngineProfile {
    pub engine: Engine,
    pub display_name: &'static str,
    pub binary: &'static str,
    pub default_port: Option<u16>,
    pub offsets: &'static [PortOffset],
    pub grace: Duration,
    pub start_timeout: Duration,
    pub default_version: &'static str,
    pub model: ProcessModel,
}

const fn server(
    engine: Engine,
    display_name: &'static str,
    binary: &'static str,
    port: u16,
    offsets: &'static [PortOffset],
    grace_secs: u64,
    default_version: &'static str,
) -> EngineProfile {
    EngineProfile {
        engine,
        display_name,
        binary,
        default_port: Some(port),
        offsets,
        grace: Duration::from_secs(grace_secs),
        start_timeout: Duration::from_secs(30),
        default_version,
        model: ProcessModel::Server,
    }
}

const fn embedded(
    engine: Engine,
    display_name: &'static str,
    binary: &'static str,
    default_version: &'static str,
) -> EngineProfile {
    EngineProfile {
        engine,
        display_name,
        binary,
        default_port: None,
        offsets: &[],
        grace: Duration::ZERO,
        start_timeout: Duration::from_secs(5),
        default_version,
        model: ProcessModel::Embedded,
    }
}

const COCKROACH_OFFSETS: &[PortOffset] = &[PortOffset { label: "http", offset: 1 }];
const TYPEDB_OFFSETS: &[PortOffset] = &[PortOffset { label: "http", offset: 6271 }];
const CLICKHOUSE_OFFSETS: &[PortOffset] = &[PortOffset { label: "http", offset: -877 }];
const QUESTDB_OFFSETS: &[PortOffset] = &[
    PortOffset { label: "http", offset: 188 },
    PortOffset { label: "ilp", offset: 197 },
];
const GRPC_NEXT: &[PortOffset] = &[PortOffset { label: "grpc", offset: 1 }];

static POSTGRESQL: EngineProfile = server(Engine::Postgresql, "PostgreSQL", "postgres", 5432, &[], 10, "17");
static MYSQL: EngineProfile = server(Engine::Mysql, "MySQL", "mysqld", 3306, &[], 15, "8.4");
static MARIADB: EngineProfile = server(Engine::Mariadb, "MariaDB", "mariadbd", 3307, &[], 15, "11.4");
static COCKROACHDB: EngineProfile = server(Engine::Cockroachdb, "CockroachDB", "cockroach", 26257, COCKROACH_OFFSETS, 15, "24.3");
// mmap-backed storage needs the longer grace to flush cleanly.
static MONGODB: EngineProfile = server(Engine::Mongodb, "MongoDB", "mongod", 27017, &[], 20, "8.0");
static REDIS: EngineProfile = server(Engine::Redis, "Redis", "redis-server", 6379, &[], 5, "7.4");
static VALKEY: EngineProfile = server(Engine::Valkey, "Valkey", "valkey-server", 6380, &[], 5, "8.0");
static COUCHDB: EngineProfile = server(Engine::Couchdb, "CouchDB", "couchdb", 5984, &[], 10, "3.4");
static SURREALDB: EngineProfile = server(Engine::Surrealdb, "SurrealDB", "surreal", 8000, &[], 10, "2.1");
static TYPEDB: EngineProfile = server(Engine::Typedb, "TypeDB", "typedb", 1729, TYPEDB_OFFSETS, 15, "3.0");
static CLICKHOUSE: EngineProfile = server(Engine::Clickhouse, "ClickHouse", "clickhouse", 9000, CLICKHOUSE_OFFSETS, 30, "25.1");
static QUESTDB: EngineProfile = server(Engine::Questdb, "QuestDB", "questdb", 8812, QUESTDB_OFFSETS, 15, "8.2");
static INFLUXDB: EngineProfile = server(Engine::Influxdb, "InfluxDB", "influxd", 8086, &[], 10, "2.7");
static QDRANT: EngineProfile = server(Engine::Qdrant, "Qdrant", "qdrant", 6333, GRPC_NEXT, 10, "1.13");
static MEILISEARCH: EngineProfile = server(Engine::Meilisearch, "Meilisearch", "meilisearch", 7700, &[], 10, "1.12");
static WEAVIATE: EngineProfile = server(Engine::Weaviate, "Weaviate", "weaviate", 8080, GRPC_NEXT, 10, "1.28");
static SQLITE: EngineProfile = embedded(Engine::Sqlite, "SQLite", "sqlite3", "3");
static DUCKDB: EngineProfile = embedded(Engine::Duckdb, "DuckDB", "duckdb", "1.1");

pub fn profile(engine: Engine) -> &'static EngineProfile {
    match engine {
        Engine::Postgresql => &POSTGRESQL,
        Engine::Mysql => &MYSQL,
        Engine::Mariadb => &MARIADB,
        Engine::Cockroachdb => &COCKROACHDB,
        Engine::Mongodb => &MONGODB,
        Engine::Redis => &REDIS,
        Engine::Valkey => &VALKEY,
        Engine::Couchdb => &COUCHDB,
        Engine::Surrealdb => &SURREALDB,
        Engine::Typedb => &TYPEDB,
        Engine::Clickhouse => &CLICKHOUSE,
        Engine::Questdb => &QUESTDB,
        Engine::Influxdb => &INFLUXDB,
        Engine::Qdrant => &QDRANT,
        Engine::Meilisearch => &MEILISEARCH,
        Engine::Weaviate => &WEAVIATE,
        Engine::Sqlite => &SQLITE,
        Engine::Duckdb => &DUCKDB,
    }
}
