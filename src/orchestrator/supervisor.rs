use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::registry::ContainerPaths;
use super::state::ProcessRecord;
use crate::error::{ContainerError, Result, SpawnFailure};
use crate::platform::{self, GracefulSignal, PlatformTimings, TerminateMode};

/// How long to wait for a process to disappear after SIGKILL.
const FORCE_KILL_WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// SpawnSpec
// ---------------------------------------------------------------------------

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

// ---------------------------------------------------------------------------
// StopProcedure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopStep {
    /// Cooperative signal, then wait up to `grace` for exit.
    Signal {
        signal: GracefulSignal,
        grace: Duration,
    },
    /// Client-side shutdown command (e.g. `mysqladmin shutdown`), then wait.
    Command { spec: SpawnSpec, grace: Duration },
}

impl StopStep {
    fn grace(&self) -> Duration {
        match self {
            StopStep::Signal { grace, .. } | StopStep::Command { grace, .. } => *grace,
        }
    }
}

/// Ordered shutdown steps. A forceful kill always follows the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopProcedure {
    pub steps: Vec<StopStep>,
}

impl StopProcedure {
    pub fn signal(signal: GracefulSignal, grace: Duration) -> Self {
        Self {
            steps: vec![StopStep::Signal { signal, grace }],
        }
    }

    pub fn command(spec: SpawnSpec, grace: Duration) -> Self {
        Self {
            steps: vec![StopStep::Command { spec, grace }],
        }
    }

    pub fn then_signal(mut self, signal: GracefulSignal, grace: Duration) -> Self {
        self.steps.push(StopStep::Signal { signal, grace });
        self
    }

    pub fn total_grace(&self) -> Duration {
        self.steps.iter().map(StopStep::grace).sum()
    }
}

// ---------------------------------------------------------------------------
// SupervisorPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorPhase {
    Unstarted,
    Spawning,
    Detached,
    Probing,
    Running,
    Stopping,
    Stopped,
    Failed { reason: String },
}

fn transition(container: &str, phase: &mut SupervisorPhase, next: SupervisorPhase) {
    debug!(container, from = ?phase, to = ?next, "phase");
    *phase = next;
}

// ---------------------------------------------------------------------------
// DetachedProcess
// ---------------------------------------------------------------------------

/// A spawned server that has survived detach confirmation.
///
/// Holds on to the child handle while this invocation lives so that exit
/// is observed through `try_wait` rather than a racy PID probe.
pub struct DetachedProcess {
    pid: u32,
    container: String,
    child: Mutex<Option<Child>>,
    phase: Mutex<SupervisorPhase>,
}

impl DetachedProcess {
    fn new(container: &str, pid: u32, child: Child) -> Self {
        Self {
            pid,
            container: container.to_string(),
            child: Mutex::new(Some(child)),
            phase: Mutex::new(SupervisorPhase::Detached),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
            .lock()
            .map(|phase| phase.clone())
            .unwrap_or(SupervisorPhase::Detached)
    }

    /// Move to `next`, e.g. `Probing` while readiness is polled and
    /// `Running` once the server answers.
    pub fn advance(&self, next: SupervisorPhase) {
        if let Ok(mut phase) = self.phase.lock() {
            transition(&self.container, &mut phase, next);
        }
    }

    fn record(&self, next: SupervisorPhase) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = next;
        }
    }

    /// `Some(code)` once the process has exited, `None` while it runs.
    pub fn exit_status(&self) -> Option<Option<i32>> {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => return Some(status.code()),
                    Ok(None) => return None,
                    Err(e) => debug!(pid = self.pid, error = %e, "try_wait failed"),
                }
            }
        }
        if platform::is_process_alive(self.pid) {
            None
        } else {
            Some(None)
        }
    }

    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }
}

// ---------------------------------------------------------------------------
// StopTarget
// ---------------------------------------------------------------------------

/// Everything [`ProcessSupervisor::terminate`] needs about one container.
pub struct StopTarget<'a> {
    pub container: &'a str,
    pub pid: Option<u32>,
    pub procedure: &'a StopProcedure,
    pub paths: &'a ContainerPaths,
    pub ports: &'a [u16],
    /// Substrings identifying a stray listener as belonging to this
    /// container (its directory with a trailing separator).
    pub markers: &'a [String],
}

// ---------------------------------------------------------------------------
// ProcessSupervisor
// ---------------------------------------------------------------------------

pub struct ProcessSupervisor {
    timings: PlatformTimings,
    reliable_confirmation: bool,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            timings: platform::timings(),
            reliable_confirmation: platform::reliable_spawn_confirmation(),
        }
    }

    pub fn with_timings(timings: PlatformTimings, reliable_confirmation: bool) -> Self {
        Self {
            timings,
            reliable_confirmation,
        }
    }

    pub fn timings(&self) -> PlatformTimings {
        self.timings
    }

    /// Platform-scaled grace period.
    pub fn scale_grace(&self, grace: Duration) -> Duration {
        grace * self.timings.grace_factor.max(1)
    }

    /// Open the container log for appending and mark the start of a run.
    fn open_log(log: &Path, header: &str) -> std::io::Result<File> {
        if let Some(parent) = log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(log)?;
        writeln!(
            file,
            "--- {} {} ---",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            header
        )?;
        Ok(file)
    }

    fn spawn_failed(container: &str, log: &Path, reason: SpawnFailure) -> ContainerError {
        ContainerError::SpawnFailed {
            container: container.to_string(),
            reason,
            log_path: log.to_path_buf(),
        }
    }

    /// Spawn `spec` detached from this process with output appended to the
    /// container log, confirm it survived startup and record its PID.
    pub async fn spawn(
        &self,
        container: &str,
        spec: &SpawnSpec,
        paths: &ContainerPaths,
        ports: Vec<u16>,
    ) -> Result<DetachedProcess> {
        let mut phase = SupervisorPhase::Unstarted;
        let log = paths.log.as_path();

        if !spec.program.is_file() {
            return Err(Self::spawn_failed(
                container,
                log,
                SpawnFailure::MissingExecutable {
                    program: spec.program.clone(),
                },
            ));
        }

        transition(container, &mut phase, SupervisorPhase::Spawning);
        info!(container, "spawning: {}", spec.display());

        let log_file = Self::open_log(log, &format!("start: {}", spec.display()))?;
        let mut cmd = spec.command();
        // File handles, never pipes: a pipe held by the detached server would
        // keep this invocation from exiting.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(log_file.try_clone()?));
        cmd.stderr(Stdio::from(log_file));
        cmd.kill_on_drop(false);
        platform::configure_detached(&mut cmd);

        let spawned = cmd.spawn();
        // Release the parent's copies of the log handles.
        drop(cmd);
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::spawn_failed(
                    container,
                    log,
                    SpawnFailure::MissingExecutable {
                        program: spec.program.clone(),
                    },
                ));
            }
            Err(e) => {
                return Err(Self::spawn_failed(
                    container,
                    log,
                    SpawnFailure::Io {
                        message: e.to_string(),
                    },
                ));
            }
        };

        let Some(pid) = child.id() else {
            let code = child.wait().await.ok().and_then(|s| s.code());
            return Err(Self::spawn_failed(
                container,
                log,
                SpawnFailure::EarlyExit { code },
            ));
        };
        debug!(container, pid, "child spawned");

        let record = ProcessRecord::new(pid, ports);

        if self.reliable_confirmation {
            let confirmed = tokio::time::timeout(self.timings.confirm_timeout, async {
                tokio::select! {
                    status = child.wait() => Err(SpawnFailure::EarlyExit {
                        code: status.ok().and_then(|s| s.code()),
                    }),
                    _ = tokio::time::sleep(self.timings.settle) => Ok(()),
                }
            })
            .await
            .unwrap_or(Err(SpawnFailure::Timeout {
                after: self.timings.confirm_timeout,
            }));

            if let Err(reason) = confirmed {
                transition(
                    container,
                    &mut phase,
                    SupervisorPhase::Failed {
                        reason: reason.to_string(),
                    },
                );
                if matches!(reason, SpawnFailure::Timeout { .. }) {
                    let _ = child.kill().await;
                }
                return Err(Self::spawn_failed(container, log, reason));
            }

            if let Err(source) = record.save(&paths.pid) {
                warn!(container, pid, "pid file write failed, killing process");
                let _ = child.kill().await;
                let _ = ProcessRecord::remove(&paths.pid);
                return Err(ContainerError::PidPersistFailed {
                    container: container.to_string(),
                    pid,
                    pid_path: paths.pid.clone(),
                    source,
                });
            }
        } else {
            // Exit is not reported reliably for detached children here:
            // record the PID first, then give the process time to fail.
            if let Err(source) = record.save(&paths.pid) {
                warn!(container, pid, "pid file write failed, killing process");
                let _ = child.kill().await;
                let _ = ProcessRecord::remove(&paths.pid);
                return Err(ContainerError::PidPersistFailed {
                    container: container.to_string(),
                    pid,
                    pid_path: paths.pid.clone(),
                    source,
                });
            }
            tokio::time::sleep(self.timings.settle).await;
            if let Ok(Some(status)) = child.try_wait() {
                let _ = ProcessRecord::remove(&paths.pid);
                let reason = SpawnFailure::EarlyExit {
                    code: status.code(),
                };
                transition(
                    container,
                    &mut phase,
                    SupervisorPhase::Failed {
                        reason: reason.to_string(),
                    },
                );
                return Err(Self::spawn_failed(container, log, reason));
            }
        }

        transition(container, &mut phase, SupervisorPhase::Detached);
        Ok(DetachedProcess::new(container, pid, child))
    }

    /// Run a one-shot command (data-directory init, client shutdown) to
    /// completion with output appended to `log`. Returns a message on
    /// failure.
    pub async fn run_to_completion(
        &self,
        spec: &SpawnSpec,
        log: &Path,
        timeout: Duration,
    ) -> std::result::Result<(), String> {
        if !spec.program.is_file() {
            return Err(SpawnFailure::MissingExecutable {
                program: spec.program.clone(),
            }
            .to_string());
        }
        let log_file = Self::open_log(log, &format!("run: {}", spec.display()))
            .map_err(|e| format!("opening {}: {}", log.display(), e))?;
        let mut cmd = spec.command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(
            log_file.try_clone().map_err(|e| e.to_string())?,
        ));
        cmd.stderr(Stdio::from(log_file));
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| e.to_string())?;
        drop(cmd);
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(format!("{} exited with {}", spec.display(), status)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => {
                let _ = child.kill().await;
                Err(format!("{} timed out after {:?}", spec.display(), timeout))
            }
        }
    }

    async fn wait_for_exit<F>(is_alive: &F, timeout: Duration) -> bool
    where
        F: Fn() -> bool,
    {
        let start = Instant::now();
        while is_alive() {
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        true
    }

    /// Stop a container's server: run the graceful steps, escalate to a
    /// forceful kill, sweep stray listeners on its ports and wait for the
    /// ports to be released. Succeeds if nothing was running.
    pub async fn terminate(
        &self,
        target: &StopTarget<'_>,
        handle: Option<&DetachedProcess>,
    ) -> Result<()> {
        let container = target.container;
        // A server without a handle was detached by an earlier invocation.
        let mut phase = handle.map_or(SupervisorPhase::Detached, DetachedProcess::phase);
        let mut enter = |next: SupervisorPhase| {
            transition(container, &mut phase, next.clone());
            if let Some(h) = handle {
                h.record(next);
            }
        };
        enter(SupervisorPhase::Stopping);

        if let Some(pid) = target.pid {
            let is_alive = || match handle {
                Some(h) if h.pid() == pid => h.is_running(),
                _ => platform::is_process_alive(pid),
            };

            if is_alive() {
                let mut exited = false;
                for step in &target.procedure.steps {
                    let grace = self.scale_grace(step.grace());
                    match step {
                        StopStep::Signal { signal, .. } => {
                            if let Err(e) = platform::terminate(pid, TerminateMode::Graceful(*signal))
                            {
                                warn!(container, pid, error = %e, "graceful signal failed");
                            }
                        }
                        StopStep::Command { spec, .. } => {
                            if let Err(message) =
                                self.run_to_completion(spec, &target.paths.log, grace).await
                            {
                                debug!(container, "shutdown command failed: {}", message);
                                continue;
                            }
                        }
                    }
                    if Self::wait_for_exit(&is_alive, grace).await {
                        debug!(container, pid, "exited after graceful stop");
                        exited = true;
                        break;
                    }
                }

                if !exited {
                    warn!(container, pid, "still running after grace period, killing");
                    if let Err(e) = platform::terminate(pid, TerminateMode::Forceful) {
                        warn!(container, pid, error = %e, "forceful kill failed");
                    }
                    if !Self::wait_for_exit(&is_alive, FORCE_KILL_WAIT).await {
                        enter(SupervisorPhase::Failed {
                            reason: "termination failed".to_string(),
                        });
                        return Err(ContainerError::TerminationFailed {
                            container: container.to_string(),
                            pid,
                        });
                    }
                }
            }
        }

        let swept = self.sweep_ports(target.ports, target.markers).await;
        if !swept.is_empty() {
            info!(container, ?swept, "killed stray listeners");
        }

        if !super::ports::wait_for_release(target.ports, self.timings.port_release).await {
            warn!(container, ports = ?target.ports, "ports not released after stop");
        }
        ProcessRecord::remove(&target.paths.pid)?;
        enter(SupervisorPhase::Stopped);
        Ok(())
    }

    /// Force-kill processes listening on `ports` whose command line contains
    /// one of `markers`. Listeners that cannot be attributed are left alone.
    /// Returns the killed PIDs.
    pub async fn sweep_ports(&self, ports: &[u16], markers: &[String]) -> Vec<u32> {
        let own_pid = std::process::id();
        let mut killed = Vec::new();
        for &port in ports {
            for pid in platform::find_processes_on_port(port) {
                if pid == own_pid || killed.contains(&pid) {
                    continue;
                }
                let Some(cmdline) = platform::process_command_line(pid) else {
                    debug!(port, pid, "listener command line unavailable, skipping");
                    continue;
                };
                if !markers.iter().any(|m| !m.is_empty() && cmdline.contains(m.as_str())) {
                    debug!(port, pid, "listener is not ours: {}", cmdline);
                    continue;
                }
                warn!(port, pid, "killing orphaned listener: {}", cmdline);
                if let Err(e) = platform::terminate(pid, TerminateMode::Forceful) {
                    warn!(pid, error = %e, "kill failed");
                    continue;
                }
                killed.push(pid);
            }
        }
        for &pid in &killed {
            let is_alive = || platform::is_process_alive(pid);
            if !Self::wait_for_exit(&is_alive, FORCE_KILL_WAIT).await {
                warn!(pid, "orphan still alive after kill");
            }
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn fast() -> ProcessSupervisor {
        ProcessSupervisor::with_timings(
            PlatformTimings {
                port_release: Duration::from_millis(500),
                settle: Duration::from_millis(150),
                confirm_timeout: Duration::from_secs(5),
                grace_factor: 1,
            },
            true,
        )
    }

    #[test]
    fn spawn_spec_builder() {
        let spec = SpawnSpec::new("/bin/echo")
            .arg("a")
            .args(["b", "c"])
            .env("K", "V")
            .current_dir("/tmp");
        assert_eq!(spec.args, vec!["a", "b", "c"]);
        assert_eq!(spec.env["K"], "V");
        assert_eq!(spec.working_dir.as_deref(), Some(Path::new("/tmp")));
        assert_eq!(spec.display(), "/bin/echo a b c");
    }

    #[test]
    fn stop_procedure_accumulates_grace() {
        let procedure = StopProcedure::command(SpawnSpec::new("/bin/true"), Duration::from_secs(5))
            .then_signal(GracefulSignal::Term, Duration::from_secs(10));
        assert_eq!(procedure.steps.len(), 2);
        assert_eq!(procedure.total_grace(), Duration::from_secs(15));
    }

    #[test]
    fn grace_is_scaled_by_platform_factor() {
        let sup = ProcessSupervisor::with_timings(
            PlatformTimings {
                port_release: Duration::ZERO,
                settle: Duration::ZERO,
                confirm_timeout: Duration::ZERO,
                grace_factor: 2,
            },
            false,
        );
        assert_eq!(sup.scale_grace(Duration::from_secs(10)), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
        let err = fast()
            .spawn("demo", &SpawnSpec::new(dir.path().join("nope")), &paths, vec![])
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ContainerError::SpawnFailed {
                reason: SpawnFailure::MissingExecutable { .. },
                ..
            }
        ));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh(script: &str) -> SpawnSpec {
            SpawnSpec::new("/bin/sh").args(["-c", script])
        }

        fn stop_target<'a>(
            paths: &'a ContainerPaths,
            pid: u32,
            procedure: &'a StopProcedure,
        ) -> StopTarget<'a> {
            StopTarget {
                container: "demo",
                pid: Some(pid),
                procedure,
                paths,
                ports: &[],
                markers: &[],
            }
        }

        #[tokio::test]
        async fn spawn_detaches_and_records_pid() {
            let dir = tempfile::tempdir().unwrap();
            let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
            let sup = fast();
            let process = sup
                .spawn("demo", &sh("echo booting; exec sleep 30"), &paths, vec![6379])
                .await
                .unwrap();

            assert!(process.is_running());
            assert_eq!(process.phase(), SupervisorPhase::Detached);
            let record = ProcessRecord::load(&paths.pid).unwrap();
            assert_eq!(record.pid, process.pid());
            assert_eq!(record.ports, vec![6379]);

            let procedure = StopProcedure::signal(GracefulSignal::Term, Duration::from_secs(2));
            sup.terminate(&stop_target(&paths, process.pid(), &procedure), Some(&process))
                .await
                .unwrap();
            assert!(!process.is_running());
            assert!(!paths.pid.exists());

            let log = std::fs::read_to_string(&paths.log).unwrap();
            assert!(log.contains("booting"), "log was: {log}");
        }

        #[tokio::test]
        async fn phase_follows_process_through_stop() {
            let dir = tempfile::tempdir().unwrap();
            let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
            let sup = fast();
            let process = sup
                .spawn("demo", &sh("exec sleep 30"), &paths, vec![])
                .await
                .unwrap();
            process.advance(SupervisorPhase::Probing);
            assert_eq!(process.phase(), SupervisorPhase::Probing);
            process.advance(SupervisorPhase::Running);

            let procedure = StopProcedure::signal(GracefulSignal::Term, Duration::from_secs(2));
            sup.terminate(&stop_target(&paths, process.pid(), &procedure), Some(&process))
                .await
                .unwrap();
            assert_eq!(process.phase(), SupervisorPhase::Stopped);
        }

        #[tokio::test]
        async fn early_exit_fails_without_pid_file() {
            let dir = tempfile::tempdir().unwrap();
            let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
            let err = fast()
                .spawn("demo", &sh("exit 3"), &paths, vec![])
                .await
                .err()
                .unwrap();
            match err {
                ContainerError::SpawnFailed { reason, log_path, .. } => {
                    assert_eq!(reason, SpawnFailure::EarlyExit { code: Some(3) });
                    assert_eq!(log_path, paths.log);
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(!paths.pid.exists());
        }

        #[tokio::test]
        async fn unwritable_pid_file_kills_process() {
            let dir = tempfile::tempdir().unwrap();
            let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
            // A directory where the pid file should go makes the rename fail.
            std::fs::create_dir_all(paths.pid.join("blocker")).unwrap();
            let err = fast()
                .spawn("demo", &sh("exec sleep 30"), &paths, vec![])
                .await
                .err()
                .unwrap();
            match err {
                ContainerError::PidPersistFailed { pid, .. } => {
                    assert!(!platform::is_process_alive(pid));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test]
        async fn ignored_signal_escalates_to_kill() {
            let dir = tempfile::tempdir().unwrap();
            let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
            let sup = fast();
            let process = sup
                .spawn(
                    "demo",
                    &sh("trap '' TERM; while :; do sleep 1; done"),
                    &paths,
                    vec![],
                )
                .await
                .unwrap();
            let procedure =
                StopProcedure::signal(GracefulSignal::Term, Duration::from_millis(300));
            let started = Instant::now();
            sup.terminate(&stop_target(&paths, process.pid(), &procedure), Some(&process))
                .await
                .unwrap();
            assert!(!process.is_running());
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn terminate_dead_pid_is_noop() {
            let dir = tempfile::tempdir().unwrap();
            let paths = ContainerPaths::new(dir.path(), Engine::Redis, "demo");
            let procedure = StopProcedure::signal(GracefulSignal::Term, Duration::from_secs(1));
            fast()
                .terminate(&stop_target(&paths, i32::MAX as u32, &procedure), None)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn run_to_completion_reports_failure() {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("init.log");
            let sup = fast();
            sup.run_to_completion(&sh("echo ok"), &log, Duration::from_secs(5))
                .await
                .unwrap();
            let err = sup
                .run_to_completion(&sh("exit 2"), &log, Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(err.contains("exited"), "{err}");
            let err = sup
                .run_to_completion(&sh("sleep 10"), &log, Duration::from_millis(200))
                .await
                .unwrap_err();
            assert!(err.contains("timed out"), "{err}");
            assert!(std::fs::read_to_string(&log).unwrap().contains("ok"));
        }

        #[tokio::test]
        async fn sweep_never_touches_foreign_or_own_listeners() {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let own_cmdline = platform::process_command_line(std::process::id()).unwrap_or_default();
            let markers = vec!["definitely-not-a-server".to_string(), own_cmdline];
            let killed = fast().sweep_ports(&[port], &markers).await;
            assert!(killed.is_empty());
            assert!(!crate::orchestrator::ports::check_port_available(port));
        }
    }
}
