use anyhow::{bail, Context, Result};
use backon::{ConstantBuilder, Retryable};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

use super::supervisor::{DetachedProcess, SpawnSpec};

/// Engine-supplied health signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Tcp {
        port: u16,
    },
    /// Ready once the URL answers with a 2xx status.
    Http {
        url: String,
    },
    /// Ready once the command exits 0 (and prints `expect_stdout`, if set).
    Command {
        spec: SpawnSpec,
        expect_stdout: Option<String>,
    },
    FileExists {
        path: PathBuf,
    },
}

impl Probe {
    pub fn http(url: impl Into<String>) -> Self {
        Probe::Http { url: url.into() }
    }

    pub fn command(spec: SpawnSpec) -> Self {
        Probe::Command {
            spec,
            expect_stdout: None,
        }
    }

    pub fn command_expecting(spec: SpawnSpec, expect: &str) -> Self {
        Probe::Command {
            spec,
            expect_stdout: Some(expect.to_string()),
        }
    }

    /// Run a single (non-retrying) check.
    async fn check(&self, client: &reqwest::Client) -> Result<()> {
        match self {
            Probe::Tcp { port } => {
                tokio::net::TcpStream::connect(("127.0.0.1", *port))
                    .await
                    .with_context(|| format!("TCP connect to port {}", port))?;
                Ok(())
            }
            Probe::Http { url } => {
                let response = client.get(url).send().await.context("HTTP ready check")?;
                if !response.status().is_success() {
                    bail!("HTTP ready check returned status {}", response.status());
                }
                Ok(())
            }
            Probe::Command {
                spec,
                expect_stdout,
            } => {
                let mut cmd = spec.command();
                cmd.stdin(Stdio::null());
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::null());
                // A timed-out attempt drops this future; the client must die with it.
                cmd.kill_on_drop(true);
                let output = cmd
                    .output()
                    .await
                    .with_context(|| format!("running {}", spec.display()))?;
                if !output.status.success() {
                    bail!("{} returned {}", spec.display(), output.status);
                }
                if let Some(expected) = expect_stdout {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    if !stdout.contains(expected.as_str()) {
                        bail!("expected {:?} in output, got {:?}", expected, stdout.trim());
                    }
                }
                Ok(())
            }
            Probe::FileExists { path } => {
                if !path.exists() {
                    bail!("{} does not exist", path.display());
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Overall budget.
    pub timeout: Duration,
    pub interval: Duration,
    /// Bound on one probe invocation.
    pub attempt_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
    /// The supervised process died while being probed.
    ProcessExited { code: Option<i32> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

pub struct ReadinessProber {
    client: reqwest::Client,
}

impl Default for ReadinessProber {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessProber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                debug!(error = %e, "custom HTTP client unavailable, using default");
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Poll `probe` until it succeeds, `settings.timeout` elapses or
    /// `process` exits. Every attempt is bounded by
    /// `settings.attempt_timeout` and counts as one failure when cut off.
    pub async fn wait_until_ready(
        &self,
        probe: &Probe,
        settings: &ProbeSettings,
        process: Option<&DetachedProcess>,
    ) -> Readiness {
        let attempts = AtomicU32::new(0);
        let interval = settings.interval.max(Duration::from_millis(10));
        let max_times = (settings.timeout.as_millis() / interval.as_millis()) as usize + 1;

        let polling = (|| async {
            attempts.fetch_add(1, Ordering::Relaxed);
            match tokio::time::timeout(settings.attempt_timeout, probe.check(&self.client)).await {
                Ok(result) => result,
                Err(_) => bail!("probe attempt timed out after {:?}", settings.attempt_timeout),
            }
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(interval)
                .with_max_times(max_times),
        )
        .notify(|err: &anyhow::Error, dur: Duration| {
            debug!("not ready: {:#}, retrying in {:?}", err, dur);
        });

        let exited = async {
            match process {
                Some(p) => loop {
                    if let Some(code) = p.exit_status() {
                        return code;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                },
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::time::timeout(settings.timeout, async {
            tokio::select! {
                result = polling => match result {
                    Ok(()) => Readiness::Ready { attempts: 0 },
                    Err(_) => Readiness::TimedOut { attempts: 0 },
                },
                code = exited => Readiness::ProcessExited { code },
            }
        })
        .await
        .unwrap_or(Readiness::TimedOut { attempts: 0 });

        let attempts = attempts.load(Ordering::Relaxed);
        match outcome {
            Readiness::Ready { .. } => Readiness::Ready { attempts },
            Readiness::TimedOut { .. } => Readiness::TimedOut { attempts },
            exited => exited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::AsyncWriteExt;

    fn quick(timeout_ms: u64) -> ProbeSettings {
        ProbeSettings {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(50),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    fn closed_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn tcp_probe_succeeds_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let outcome = ReadinessProber::new()
            .wait_until_ready(&Probe::Tcp { port }, &quick(2000), None)
            .await;
        assert!(outcome.is_ready(), "{outcome:?}");
    }

    #[tokio::test]
    async fn never_ready_probe_times_out_on_budget() {
        let started = Instant::now();
        let outcome = ReadinessProber::new()
            .wait_until_ready(&Probe::Tcp { port: closed_port() }, &quick(2000), None)
            .await;
        let elapsed = started.elapsed();
        match outcome {
            Readiness::TimedOut { attempts } => assert!(attempts > 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test]
    async fn http_probe_requires_success_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });
        let outcome = ReadinessProber::new()
            .wait_until_ready(
                &Probe::http(format!("http://127.0.0.1:{}/health", port)),
                &quick(3000),
                None,
            )
            .await;
        assert!(outcome.is_ready(), "{outcome:?}");
    }

    #[tokio::test]
    async fn file_probe() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ReadinessProber::new()
            .wait_until_ready(
                &Probe::FileExists {
                    path: dir.path().to_path_buf(),
                },
                &quick(500),
                None,
            )
            .await;
        assert_eq!(outcome, Readiness::Ready { attempts: 1 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_probe_matches_stdout() {
        let ok = Probe::command_expecting(
            SpawnSpec::new("/bin/sh").args(["-c", "echo PONG"]),
            "PONG",
        );
        let wrong = Probe::command_expecting(
            SpawnSpec::new("/bin/sh").args(["-c", "echo LOADING"]),
            "PONG",
        );
        let prober = ReadinessProber::new();
        assert!(prober.wait_until_ready(&ok, &quick(2000), None).await.is_ready());
        assert!(!prober.wait_until_ready(&wrong, &quick(300), None).await.is_ready());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_probe_is_bounded_per_attempt() {
        let probe = Probe::command(SpawnSpec::new("/bin/sh").args(["-c", "sleep 30"]));
        let started = Instant::now();
        let outcome = ReadinessProber::new()
            .wait_until_ready(&probe, &quick(1000), None)
            .await;
        match outcome {
            Readiness::TimedOut { attempts } => assert!(attempts >= 2, "{attempts}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_process_exit_aborts_probing() {
        use crate::engine::Engine;
        use crate::orchestrator::registry::ContainerPaths;
        use crate::orchestrator::supervisor::ProcessSupervisor;

        let dir = tempfile::tempdir().unwrap();
        let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
        let process = ProcessSupervisor::new()
            .spawn(
                "demo",
                &SpawnSpec::new("/bin/sh").args(["-c", "sleep 1; exit 4"]),
                &paths,
                vec![],
            )
            .await
            .unwrap();

        let started = Instant::now();
        let outcome = ReadinessProber::new()
            .wait_until_ready(&Probe::Tcp { port: closed_port() }, &quick(20_000), Some(&process))
            .await;
        assert_eq!(outcome, Readiness::ProcessExited { code: Some(4) });
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
