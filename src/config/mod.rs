pub mod model;
pub mod resolve;

use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::Engine;
use model::Settings;

/// Load `config.toml`. A missing file means defaults.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => anyhow::bail!("Failed to read config file {}: {}", path.display(), e),
    };
    let mut settings: Settings = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
    // Section names may use aliases ("postgres"); store them canonically.
    let mut engines = BTreeMap::new();
    for (key, overrides) in std::mem::take(&mut settings.engines) {
        let engine = key
            .parse::<Engine>()
            .map_err(|e| anyhow::anyhow!("{} in [engines.{}] of {}", e, key, path.display()))?;
        engines.insert(engine.as_str().to_string(), overrides);
    }
    settings.engines = engines;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let settings = load_settings(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn loads_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[engines.redis]\ngrace = \"2s\"\n\n[engines.postgres]\nport = 5433\n")
            .unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.grace(Engine::Redis), Duration::from_secs(2));
        assert_eq!(settings.default_port(Engine::Postgresql), Some(5433));
    }

    #[test]
    fn unknown_engine_section_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[engines.redsi]\nport = 1\n").unwrap();
        let err = load_settings(&path).unwrap_err().to_string();
        assert!(err.contains("redsi"), "{err}");
        assert!(err.contains("did you mean `redis`"), "{err}");
    }

    #[test]
    fn parse_error_names_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[ports\n").unwrap();
        let err = load_settings(&path).unwrap_err().to_string();
        assert!(err.contains("config.toml"), "{err}");
    }
}
