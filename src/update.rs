//! Background check for a newer release.
//!
//! Runs on its own task next to the command and never influences its
//! outcome: every failure is logged at debug level and swallowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::model::UpdateSettings;

/// Environment variable disabling the check.
pub const DISABLE_ENV: &str = "DBRIG_NO_UPDATE_CHECK";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub checked_at: DateTime<Utc>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
    pub current: String,
    pub latest: String,
}

impl std::fmt::Display for UpdateNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dbrig {} is available (you have {})",
            self.latest, self.current
        )
    }
}

/// Remote version lookup memoised in memory and in `update-check.json`.
pub struct VersionCache {
    path: PathBuf,
    memo: Mutex<Option<UpdateCheck>>,
}

impl VersionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memo: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<UpdateCheck> {
        if let Ok(memo) = self.memo.lock() {
            if memo.is_some() {
                return memo.clone();
            }
        }
        let content = std::fs::read_to_string(&self.path).ok()?;
        let check: UpdateCheck = serde_json::from_str(&content).ok()?;
        if let Ok(mut memo) = self.memo.lock() {
            *memo = Some(check.clone());
        }
        Some(check)
    }

    pub fn store(&self, check: UpdateCheck) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&check)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        if let Ok(mut memo) = self.memo.lock() {
            *memo = Some(check);
        }
        Ok(())
    }

    /// Forget the memoised result, on disk as well.
    pub fn invalidate(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            *memo = None;
        }
        let _ = std::fs::remove_file(&self.path);
    }

    /// A cached result still inside `interval`.
    pub fn fresh(&self, interval: Duration) -> Option<UpdateCheck> {
        let check = self.get()?;
        let age = Utc::now().signed_duration_since(check.checked_at).to_std().ok()?;
        (age < interval).then_some(check)
    }
}

/// `true` when dotted version `latest` sorts after `current`. Pre-release
/// suffixes are ignored.
pub fn is_newer(latest: &str, current: &str) -> bool {
    fn parts(v: &str) -> Vec<u64> {
        v.trim_start_matches('v')
            .split(['-', '+'])
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect()
    }
    parts(latest) > parts(current)
}

async fn fetch_latest(url: &str) -> anyhow::Result<Option<String>> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("dbrig/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    let body: serde_json::Value = response.json().await?;
    let krate = &body["crate"];
    Ok(krate["max_stable_version"]
        .as_str()
        .or_else(|| krate["max_version"].as_str())
        .map(str::to_string))
}

async fn check(cache: &VersionCache, settings: &UpdateSettings, current: &str) -> Option<UpdateNotice> {
    let latest = match cache.fresh(settings.interval) {
        Some(cached) => cached.latest,
        None => {
            let latest = match fetch_latest(&settings.url).await {
                Ok(latest) => latest,
                Err(e) => {
                    debug!("update check failed: {:#}", e);
                    return None;
                }
            };
            let record = UpdateCheck {
                checked_at: Utc::now(),
                latest: latest.clone(),
            };
            if let Err(e) = cache.store(record) {
                debug!("could not cache update check: {}", e);
            }
            latest
        }
    }?;
    is_newer(&latest, current).then(|| UpdateNotice {
        current: current.to_string(),
        latest,
    })
}

/// Start the check on a background task. `None` when disabled.
pub fn spawn_check(
    cache: Arc<VersionCache>,
    settings: UpdateSettings,
) -> Option<JoinHandle<Option<UpdateNotice>>> {
    if !settings.enabled || std::env::var_os(DISABLE_ENV).is_some() {
        return None;
    }
    Some(tokio::spawn(async move {
        check(&cache, &settings, env!("CARGO_PKG_VERSION")).await
    }))
}

/// The notice, only if the task already finished; never waits.
pub async fn finished_notice(handle: JoinHandle<Option<UpdateNotice>>) -> Option<UpdateNotice> {
    if !handle.is_finished() {
        handle.abort();
        return None;
    }
    handle.await.ok().flatten()
}
