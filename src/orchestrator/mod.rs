pub mod ports;
pub mod ready;
pub mod registry;
pub mod state;
pub mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::model::Settings;
use crate::config::resolve::Layout;
use crate::engine::{AdapterContext, AdapterTable, Engine, EngineAdapter};
use crate::error::{ContainerError, Result, SpawnFailure};
use crate::platform::{self, PlatformInfo};
use crate::provision::{BinaryProvisioner, LocalProvisioner};
use crate::update::{self, UpdateNotice, VersionCache};

use ports::{format_port_conflicts, PortAllocator};
use ready::{ProbeSettings, Readiness, ReadinessProber};
use registry::{Container, ContainerPaths, ContainerRegistry, ContainerStatus};
use state::{PidState, ProcessRecord};
use supervisor::{ProcessSupervisor, StopTarget, SupervisorPhase};

/// Result of [`ContainerManager::start`].
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub container: Container,
    pub connection_string: String,
    pub pid: Option<u32>,
    /// Set when the container was already up and nothing was spawned.
    pub already_running: bool,
    /// Recoverable condition worth showing the user (port reassignment).
    pub warning: Option<String>,
}

/// Reconciled view of one container.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub container: Container,
    pub running: bool,
    pub pid: Option<u32>,
    pub message: String,
}

/// Lazily detected host description with an explicit reset.
#[derive(Default)]
struct PlatformCache {
    info: Mutex<Option<PlatformInfo>>,
}

impl PlatformCache {
    fn get(&self) -> PlatformInfo {
        match self.info.lock() {
            Ok(mut guard) => guard.get_or_insert_with(PlatformInfo::detect).clone(),
            Err(_) => PlatformInfo::detect(),
        }
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.info.lock() {
            *guard = None;
        }
    }
}

/// Lifecycle operations over every container under one data root.
///
/// Each call is a short sequential flow: ports are checked, the server is
/// spawned and probed, and the registry record is updated last. Nothing
/// keeps running in the background after a call returns apart from the
/// detached servers themselves.
pub struct ContainerManager {
    layout: Layout,
    settings: Settings,
    registry: ContainerRegistry,
    adapters: AdapterTable,
    provisioner: Arc<dyn BinaryProvisioner>,
    supervisor: ProcessSupervisor,
    prober: ReadinessProber,
    platform: PlatformCache,
    versions: Arc<VersionCache>,
}

impl ContainerManager {
    /// Manager for `layout` with settings read from its `config.toml`.
    pub fn open(layout: Layout) -> anyhow::Result<Self> {
        let settings = crate::config::load_settings(&layout.config_file())?;
        Ok(Self::new(layout, settings))
    }

    pub fn new(layout: Layout, settings: Settings) -> Self {
        let mut provisioner = LocalProvisioner::new(layout.binaries());
        for engine in Engine::ALL {
            if let Some(dir) = settings.bin_dir(engine) {
                provisioner = provisioner.with_bin_dir(engine, dir.clone());
            }
            if let Some(version) = settings.version(engine) {
                provisioner = provisioner.with_version(engine, version);
            }
        }
        Self {
            registry: ContainerRegistry::new(layout.containers()),
            versions: Arc::new(VersionCache::new(layout.update_cache())),
            adapters: AdapterTable::builtin(),
            provisioner: Arc::new(provisioner),
            supervisor: ProcessSupervisor::new(),
            prober: ReadinessProber::new(),
            platform: PlatformCache::default(),
            layout,
            settings,
        }
    }

    pub fn with_adapters(mut self, adapters: AdapterTable) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn BinaryProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    pub fn platform(&self) -> PlatformInfo {
        self.platform.get()
    }

    /// Drop the memoised platform description and version lookup.
    pub fn invalidate_caches(&self) {
        self.platform.invalidate();
        self.versions.invalidate();
    }

    /// Start the background update check, unless disabled.
    pub fn spawn_update_check(&self) -> Option<JoinHandle<Option<UpdateNotice>>> {
        update::spawn_check(self.versions.clone(), self.settings.update.clone())
    }

    fn context<'a>(
        &self,
        container: &'a Container,
        paths: &'a ContainerPaths,
        bin_dir: &'a Path,
    ) -> AdapterContext<'a> {
        AdapterContext {
            container,
            paths,
            bin_dir,
            port: container.port.unwrap_or(0),
            grace: self.settings.grace(container.engine),
        }
    }

    fn allocator(&self, except: Option<&str>) -> Result<PortAllocator> {
        Ok(PortAllocator::new(
            self.registry.reserved_ports(except)?,
            self.settings.ports.scan_limit,
        ))
    }

    async fn binaries(&self, container: &Container) -> Result<PathBuf> {
        if let Some(dir) = container.binary_path.as_ref().filter(|d| d.is_dir()) {
            return Ok(dir.clone());
        }
        self.provisioner
            .ensure_installed(container.engine, &container.version, &self.platform())
            .await
    }

    /// Directory of the engine's binaries at its default version.
    pub async fn locate_binaries(&self, engine: Engine) -> Result<PathBuf> {
        let version = self.provisioner.resolve_version(engine, None);
        self.provisioner
            .ensure_installed(engine, &version, &self.platform())
            .await
    }

    /// Argument fragment that places a process inside this container: its
    /// directory with a trailing separator, so `cache` never matches
    /// `cache2`.
    fn container_marker(paths: &ContainerPaths) -> String {
        format!(
            "{}{}",
            paths.dir.to_string_lossy(),
            std::path::MAIN_SEPARATOR
        )
    }

    /// Markers for the orphan sweep. Only the container directory is
    /// trusted, so listeners of servers that take their data directory from
    /// the environment are never swept.
    fn sweep_markers(paths: &ContainerPaths) -> Vec<String> {
        vec![Self::container_marker(paths)]
    }

    /// The live server process of `container`, if its PID file names one.
    /// A PID that now belongs to another process counts as stale and its
    /// file is removed.
    fn live_process(
        container: &Container,
        paths: &ContainerPaths,
        adapter: &dyn EngineAdapter,
    ) -> Option<ProcessRecord> {
        let PidState::Alive(record) = ProcessRecord::inspect(&paths.pid) else {
            return None;
        };
        let marker = adapter
            .args_name_container()
            .then(|| Self::container_marker(paths));
        if !record.is_same_process(marker.as_deref()) {
            debug!(
                container = %container.name,
                pid = record.pid,
                "pid reused by unrelated process: {}",
                platform::process_command_line(record.pid).unwrap_or_default()
            );
            let _ = ProcessRecord::remove(&paths.pid);
            return None;
        }
        Some(record)
    }

    fn set_status(&self, name: &str, status: ContainerStatus) -> Result<Container> {
        self.registry.update(name, |c| c.status = status)
    }

    /// Compare the stored status with what is actually running and persist
    /// the correction.
    fn reconcile(&self, container: Container) -> Result<ContainerState> {
        let paths = self.registry.paths(&container);
        let (running, pid) = if container.engine.is_embedded() {
            (
                container.status == ContainerStatus::Running && paths.data.is_dir(),
                None,
            )
        } else {
            let adapter = self.adapters.get(container.engine);
            match Self::live_process(&container, &paths, adapter.as_ref()) {
                Some(record) => (true, Some(record.pid)),
                None => (false, None),
            }
        };

        let container = match (container.status, running) {
            (ContainerStatus::Running, false) => {
                debug!(container = %container.name, "recorded as running but not alive");
                self.set_status(&container.name, ContainerStatus::Stopped)?
            }
            (ContainerStatus::Created | ContainerStatus::Stopped, true) => {
                self.set_status(&container.name, ContainerStatus::Running)?
            }
            _ => container,
        };

        let message = match (running, pid, container.port) {
            (true, Some(pid), Some(port)) => format!("running (PID {}) on port {}", pid, port),
            (true, Some(pid), None) => format!("running (PID {})", pid),
            (true, None, _) => "attached".to_string(),
            (false, _, _) => container.status.to_string(),
        };
        Ok(ContainerState {
            container,
            running,
            pid,
            message,
        })
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    /// Register a new container, allocate its ports and initialise its data
    /// directory. An explicit `port` must be free; otherwise the engine's
    /// default port is used, or the next free one above it.
    pub async fn create(
        &self,
        name: &str,
        engine: Engine,
        version: Option<&str>,
        port: Option<u16>,
    ) -> Result<Container> {
        registry::validate_name(name)?;
        if self.registry.exists(name) {
            return Err(ContainerError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let mut container = Container {
            name: name.to_string(),
            engine,
            version: self.provisioner.resolve_version(engine, version),
            port: None,
            secondary_ports: Vec::new(),
            status: ContainerStatus::Created,
            created_at: Utc::now(),
            cloned_from: None,
            binary_path: None,
        };

        if let Some(default_port) = self.settings.default_port(engine) {
            let offsets = engine.profile().offsets;
            let allocator = self.allocator(None)?;
            let assigned = match port {
                Some(explicit) => {
                    if let Some(conflict) = allocator.conflicts(name, explicit, offsets).into_iter().next() {
                        return Err(ContainerError::PortUnavailable {
                            port: conflict.port,
                            owner: conflict.owner,
                        });
                    }
                    explicit
                }
                None => {
                    let assignment = allocator.find_available_port(default_port, offsets)?;
                    if assignment.reassigned {
                        info!(
                            container = name,
                            port = assignment.port,
                            "default port {} in use",
                            default_port
                        );
                    }
                    assignment.port
                }
            };
            container.set_port(assigned)?;
        }

        let bin_dir = if engine.is_embedded() {
            PathBuf::new()
        } else {
            let dir = self.binaries(&container).await?;
            container.binary_path = Some(dir.clone());
            dir
        };

        self.registry.insert(&container)?;
        let paths = self.registry.paths(&container);
        if let Err(e) = self.initialise(&container, &paths, &bin_dir).await {
            warn!(container = name, "initialisation failed, rolling back");
            let _ = std::fs::remove_dir_all(&paths.data);
            let _ = std::fs::remove_file(&paths.record);
            let _ = ProcessRecord::remove(&paths.pid);
            return Err(e);
        }

        info!(container = name, %engine, port = ?container.port, "container created");
        Ok(container)
    }

    async fn initialise(
        &self,
        container: &Container,
        paths: &ContainerPaths,
        bin_dir: &Path,
    ) -> Result<()> {
        let adapter = self.adapters.get(container.engine);
        let ctx = self.context(container, paths, bin_dir);
        std::fs::create_dir_all(&paths.data)?;
        adapter.prepare(&ctx)?;
        let Some(spec) = adapter.init_spec(&ctx) else {
            return Ok(());
        };
        debug!(container = %container.name, "initialising: {}", spec.display());
        self.supervisor
            .run_to_completion(&spec, &paths.log, self.settings.timeouts.init)
            .await
            .map_err(|message| ContainerError::InitFailed {
                container: container.name.clone(),
                message,
                log_path: paths.log.clone(),
            })
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    /// Bring a container to `running`. Starting a running container returns
    /// its current connection details without spawning anything.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        let container = self.registry.get(name)?;
        let adapter = self.adapters.get(container.engine);
        if container.engine.is_embedded() {
            return self.attach_embedded(container, adapter.as_ref());
        }

        let paths = self.registry.paths(&container);
        if let Some(record) = Self::live_process(&container, &paths, adapter.as_ref()) {
            let container = if container.status == ContainerStatus::Running {
                container
            } else {
                self.set_status(name, ContainerStatus::Running)?
            };
            let bin_dir = container.binary_path.clone().unwrap_or_default();
            let connection_string =
                adapter.connection_string(&self.context(&container, &paths, &bin_dir));
            debug!(container = name, pid = record.pid, "already running");
            return Ok(StartOutcome {
                container,
                connection_string,
                pid: Some(record.pid),
                already_running: true,
                warning: None,
            });
        }

        // Leftovers of an interrupted run still holding our ports.
        let swept = self
            .supervisor
            .sweep_ports(&container.all_ports(), &Self::sweep_markers(&paths))
            .await;
        if !swept.is_empty() {
            warn!(container = name, ?swept, "killed orphaned server processes");
        }

        let (container, warning) = self.ensure_ports(container)?;
        let bin_dir = self.binaries(&container).await?;
        let ctx = self.context(&container, &paths, &bin_dir);
        std::fs::create_dir_all(&paths.data)?;
        adapter.prepare(&ctx)?;
        let Some(spec) = adapter.spawn_spec(&ctx) else {
            return self.attach_embedded(container, adapter.as_ref());
        };

        let process = self
            .supervisor
            .spawn(name, &spec, &paths, container.all_ports())
            .await?;

        let engine = container.engine;
        let probe_settings = ProbeSettings {
            timeout: self.settings.start_timeout(engine),
            interval: self.settings.timeouts.probe_interval,
            attempt_timeout: self.settings.timeouts.probe_attempt,
        };
        let probe = adapter.readiness_probe(&ctx);
        process.advance(SupervisorPhase::Probing);
        let readiness = self
            .prober
            .wait_until_ready(&probe, &probe_settings, Some(&process))
            .await;

        let failure = match readiness {
            Readiness::Ready { attempts } => {
                debug!(container = name, attempts, "ready");
                process.advance(SupervisorPhase::Running);
                match self.set_status(name, ContainerStatus::Running) {
                    Ok(container) => {
                        let connection_string = adapter
                            .connection_string(&self.context(&container, &paths, &bin_dir));
                        info!(container = name, pid = process.pid(), port = ?container.port, "started");
                        return Ok(StartOutcome {
                            container,
                            connection_string,
                            pid: Some(process.pid()),
                            already_running: false,
                            warning,
                        });
                    }
                    Err(e) => e,
                }
            }
            Readiness::TimedOut { attempts } => {
                warn!(container = name, attempts, "readiness timed out");
                ContainerError::ReadinessTimeout {
                    container: name.to_string(),
                    timeout: probe_settings.timeout,
                    log_path: paths.log.clone(),
                }
            }
            Readiness::ProcessExited { code } => ContainerError::SpawnFailed {
                container: name.to_string(),
                reason: SpawnFailure::EarlyExit { code },
                log_path: paths.log.clone(),
            },
        };

        // Never leave a spawned server behind an error.
        let procedure = adapter.stop_procedure(&ctx);
        let ports = container.all_ports();
        let markers = Self::sweep_markers(&paths);
        let target = StopTarget {
            container: name,
            pid: Some(process.pid()),
            procedure: &procedure,
            paths: &paths,
            ports: &ports,
            markers: &markers,
        };
        if let Err(e) = self.supervisor.terminate(&target, Some(&process)).await {
            warn!(container = name, "cleanup after failed start: {}", e);
        }
        if let Err(e) = self.set_status(name, ContainerStatus::Stopped) {
            debug!(container = name, "could not record stopped status: {}", e);
        }
        Err(failure)
    }

    /// Move the container to a free port set if any of its ports is taken
    /// by something else. Returns the warning to show when it moved.
    fn ensure_ports(&self, container: Container) -> Result<(Container, Option<String>)> {
        let Some(port) = container.port else {
            return Ok((container, None));
        };
        let offsets = container.engine.profile().offsets;
        let allocator = self.allocator(Some(&container.name))?;
        let conflicts = allocator.conflicts(&container.name, port, offsets);
        if conflicts.is_empty() {
            return Ok((container, None));
        }

        let assignment = allocator.find_available_port(port, offsets)?;
        let mut moved = container;
        moved.set_port(assignment.port)?;
        self.registry.save(&moved)?;
        let warning = format!(
            "{}Reassigned '{}' to port {}",
            format_port_conflicts(&conflicts),
            moved.name,
            assignment.port
        );
        warn!(container = %moved.name, from = port, to = assignment.port, "port reassigned");
        Ok((moved, Some(warning)))
    }

    fn attach_embedded(
        &self,
        container: Container,
        adapter: &dyn EngineAdapter,
    ) -> Result<StartOutcome> {
        let paths = self.registry.paths(&container);
        let bin_dir = PathBuf::new();
        adapter.prepare(&self.context(&container, &paths, &bin_dir))?;
        let already_running = container.status == ContainerStatus::Running;
        let container = if already_running {
            container
        } else {
            self.set_status(&container.name, ContainerStatus::Running)?
        };
        let connection_string =
            adapter.connection_string(&self.context(&container, &paths, &bin_dir));
        Ok(StartOutcome {
            container,
            connection_string,
            pid: None,
            already_running,
            warning: None,
        })
    }

    // -----------------------------------------------------------------------
    // stop
    // -----------------------------------------------------------------------

    /// Stop a container. Returns `false` when it was not running.
    pub async fn stop(&self, name: &str) -> Result<bool> {
        let container = self.registry.get(name)?;
        let paths = self.registry.paths(&container);

        if container.engine.is_embedded() {
            if container.status != ContainerStatus::Running {
                return Ok(false);
            }
            self.set_status(name, ContainerStatus::Stopped)?;
            return Ok(true);
        }

        let adapter = self.adapters.get(container.engine);
        let live = Self::live_process(&container, &paths, adapter.as_ref());
        if live.is_none() && container.status != ContainerStatus::Running {
            debug!(container = name, "already stopped");
            return Ok(false);
        }

        let bin_dir = match self.binaries(&container).await {
            Ok(dir) => dir,
            Err(e) => {
                // Client-side shutdown commands will be skipped.
                debug!(container = name, "binaries unavailable for stop: {}", e);
                PathBuf::new()
            }
        };
        let procedure = adapter.stop_procedure(&self.context(&container, &paths, &bin_dir));
        let ports = match &live {
            Some(record) if !record.ports.is_empty() => record.ports.clone(),
            _ => container.all_ports(),
        };
        let markers = Self::sweep_markers(&paths);
        let target = StopTarget {
            container: name,
            pid: live.as_ref().map(|r| r.pid),
            procedure: &procedure,
            paths: &paths,
            ports: &ports,
            markers: &markers,
        };
        self.supervisor.terminate(&target, None).await?;
        self.set_status(name, ContainerStatus::Stopped)?;
        info!(container = name, "stopped");
        Ok(live.is_some())
    }

    /// Stop every running container, continuing past failures.
    pub async fn stop_all(&self) -> Result<Vec<(String, Result<bool>)>> {
        let mut results = Vec::new();
        for state in self.list()? {
            if !state.running {
                continue;
            }
            let name = state.container.name;
            let result = self.stop(&name).await;
            if let Err(ref e) = result {
                warn!(container = %name, "stop failed: {}", e);
            }
            results.push((name, result));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // queries
    // -----------------------------------------------------------------------

    pub fn status(&self, name: &str) -> Result<ContainerState> {
        let container = self.registry.get(name)?;
        self.reconcile(container)
    }

    /// Every container with its status checked against the live processes.
    pub fn list(&self) -> Result<Vec<ContainerState>> {
        self.registry
            .list()?
            .into_iter()
            .map(|c| self.reconcile(c))
            .collect()
    }

    pub fn connection_string(&self, name: &str) -> Result<String> {
        let container = self.registry.get(name)?;
        let paths = self.registry.paths(&container);
        let bin_dir = container.binary_path.clone().unwrap_or_default();
        let adapter = self.adapters.get(container.engine);
        Ok(adapter.connection_string(&self.context(&container, &paths, &bin_dir)))
    }

    // -----------------------------------------------------------------------
    // rename / clone / delete
    // -----------------------------------------------------------------------

    pub fn rename(&self, old: &str, new: &str) -> Result<Container> {
        self.status(old)?;
        let renamed = self.registry.rename(old, new)?;
        info!(from = old, to = new, "renamed");
        Ok(renamed)
    }

    pub fn clone_container(&self, source: &str, target: &str) -> Result<Container> {
        self.status(source)?;
        let allocator = self.allocator(None)?;
        let cloned = self.registry.clone_container(source, target, &allocator)?;
        info!(from = source, to = target, port = ?cloned.port, "cloned");
        Ok(cloned)
    }

    /// Remove a container and all of its files. A running container is
    /// stopped first with `force`, refused otherwise.
    pub async fn delete(&self, name: &str, force: bool) -> Result<()> {
        let state = self.status(name)?;
        if state.running {
            if !force {
                return Err(ContainerError::NotStopped {
                    name: name.to_string(),
                });
            }
            self.stop(name).await?;
        }
        self.registry.remove(name)?;
        info!(container = name, "deleted");
        Ok(())
    }
}
