use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::Engine;

/// Contents of `config.toml` in the data root. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub ports: PortSettings,
    #[serde(default)]
    pub update: UpdateSettings,
    /// Keyed by engine name; validated against [`Engine`] on load.
    #[serde(default)]
    pub engines: BTreeMap<String, EngineOverrides>,
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_probe_attempt() -> Duration {
    Duration::from_secs(5)
}

fn default_init_timeout() -> Duration {
    Duration::from_secs(120)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    /// Readiness budget for engines without their own `start_timeout`.
    #[serde(default = "default_start_timeout", deserialize_with = "de_duration")]
    pub start: Duration,
    #[serde(default = "default_probe_interval", deserialize_with = "de_duration")]
    pub probe_interval: Duration,
    #[serde(default = "default_probe_attempt", deserialize_with = "de_duration")]
    pub probe_attempt: Duration,
    #[serde(default = "default_init_timeout", deserialize_with = "de_duration")]
    pub init: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            start: default_start_timeout(),
            probe_interval: default_probe_interval(),
            probe_attempt: default_probe_attempt(),
            init: default_init_timeout(),
        }
    }
}

fn default_scan_limit() -> u16 {
    100
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PortSettings {
    #[serde(default = "default_scan_limit")]
    pub scan_limit: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_update_url() -> String {
    "https://crates.io/api/v1/crates/dbrig".to_string()
}

fn default_update_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UpdateSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_update_url")]
    pub url: String,
    #[serde(default = "default_update_interval", deserialize_with = "de_duration")]
    pub interval: Duration,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_update_url(),
            interval: default_update_interval(),
        }
    }
}

/// Per-engine overrides layered over the built-in profile.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EngineOverrides {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub grace: Option<Duration>,
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub start_timeout: Option<Duration>,
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,
    #[serde(default)]
    pub version: Option<String>,
}

impl Settings {
    pub fn engine(&self, engine: Engine) -> Option<&EngineOverrides> {
        self.engines.get(engine.as_str())
    }

    pub fn default_port(&self, engine: Engine) -> Option<u16> {
        self.engine(engine)
            .and_then(|o| o.port)
            .or(engine.profile().default_port)
    }

    pub fn grace(&self, engine: Engine) -> Duration {
        self.engine(engine)
            .and_then(|o| o.grace)
            .unwrap_or(engine.profile().grace)
    }

    /// Readiness budget: engine override, then the engine's own default
    /// when it exceeds the global one.
    pub fn start_timeout(&self, engine: Engine) -> Duration {
        self.engine(engine)
            .and_then(|o| o.start_timeout)
            .unwrap_or_else(|| self.timeouts.start.max(engine.profile().start_timeout))
    }

    pub fn bin_dir(&self, engine: Engine) -> Option<&PathBuf> {
        self.engine(engine).and_then(|o| o.bin_dir.as_ref())
    }

    pub fn version(&self, engine: Engine) -> Option<&str> {
        self.engine(engine).and_then(|o| o.version.as_deref())
    }
}

fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
