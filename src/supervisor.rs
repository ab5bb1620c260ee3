//! Lifecycle of the feed listener worker process.
//!
//! The worker runs as its own OS process, so a crash in it never takes down
//! a merge or reconciliation in progress. Its identity is persisted in a
//! tracking record holding both the pid and the OS-reported start time;
//! a pid alone is not trusted, since the OS may reuse it.

use crate::config::Config;
use crate::store::{merge, MasterStore, MergeReport, StagingLog, StoreError};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use sysinfo::{Pid, ProcessStatus, Signal, System};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const PROBE_INTERVAL: Duration = Duration::from_millis(50);
const KILL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to spawn listener worker: {0}")]
    Spawn(String),

    #[error("Failed to terminate listener worker {pid}: {reason}")]
    Terminate { pid: u32, reason: String },

    #[error("Tracking record {path} could not be updated: {source}")]
    Tracking {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker stopped but the final merge failed: {0}")]
    Merge(#[from] StoreError),
}

/// Persisted identity of the running worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub pid: u32,
    /// Process start time as reported by the OS, seconds since the epoch.
    pub start_time: u64,
    /// Wall-clock launch time, seconds since the epoch.
    pub launched_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub worker: Option<TrackingRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { worker: TrackingRecord },
    AlreadyRunning { worker: TrackingRecord },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped {
        pid: u32,
        /// Whether the worker ignored the graceful signal and had to be killed.
        forced: bool,
        merge: MergeReport,
    },
    AlreadyStopped,
}

/// Program and arguments that launch the listener worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// This executable's `listen` subcommand.
    pub fn current_exe_listener() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, &["listen"]))
    }
}

pub struct Supervisor {
    command: WorkerCommand,
    tracking_path: PathBuf,
    log_path: PathBuf,
    grace_period: Duration,
    staging: StagingLog,
    master: MasterStore,
    /// Handle of a worker spawned by this process, kept so it can be reaped.
    child: Option<Child>,
    system: System,
}

impl Supervisor {
    pub fn new(
        command: WorkerCommand,
        tracking_path: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        grace_period: Duration,
        staging: StagingLog,
        master: MasterStore,
    ) -> Self {
        Self {
            command,
            tracking_path: tracking_path.into(),
            log_path: log_path.into(),
            grace_period,
            staging,
            master,
            child: None,
            system: System::new(),
        }
    }

    /// Supervisor for this executable's `listen` worker, wired from configuration.
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        Ok(Self::new(
            WorkerCommand::current_exe_listener()?,
            &config.tracking_path,
            &config.listener_log_path,
            config.stop_grace_period,
            StagingLog::new(&config.staging_path),
            MasterStore::new(&config.master_path, config.master_on_corrupt),
        ))
    }

    pub fn tracking_path(&self) -> &Path {
        &self.tracking_path
    }

    pub async fn status(&mut self) -> WorkerStatus {
        match self.live_worker().await {
            Some(worker) => WorkerStatus {
                state: WorkerState::Running,
                worker: Some(worker),
            },
            None => WorkerStatus {
                state: WorkerState::Stopped,
                worker: None,
            },
        }
    }

    pub async fn is_running(&mut self) -> bool {
        self.live_worker().await.is_some()
    }

    /// Launch the worker unless one is already running.
    pub async fn start(&mut self) -> Result<StartOutcome, LifecycleError> {
        if let Some(worker) = self.live_worker().await {
            debug!("Listener worker {} already running", worker.pid);
            return Ok(StartOutcome::AlreadyRunning { worker });
        }

        let mut child = self.spawn_worker()?;
        let pid = child.id();

        let start_time = match self.process_start_time(pid) {
            Some(start_time) => start_time,
            None => {
                let status = child.try_wait().ok().flatten();
                return Err(LifecycleError::Spawn(format!(
                    "worker {} exited immediately ({:?})",
                    pid, status
                )));
            }
        };

        let worker = TrackingRecord {
            pid,
            start_time,
            launched_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self.write_tracking(&worker).await {
            // An untracked worker could never be stopped; do not leave it behind
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        self.child = Some(child);
        info!("Started listener worker with pid {}", pid);
        Ok(StartOutcome::Started { worker })
    }

    /// Terminate the worker, then fold whatever it staged into the master store.
    ///
    /// Sends a graceful termination signal, waits up to the grace period and
    /// kills the worker if it is still alive.
    pub async fn stop(&mut self) -> Result<StopOutcome, LifecycleError> {
        let Some(worker) = self.live_worker().await else {
            self.clear_stale_tracking().await?;
            return Ok(StopOutcome::AlreadyStopped);
        };

        let pid = worker.pid;
        self.signal(pid, Signal::Term)?;
        let forced = if self.wait_for_exit(&worker, self.grace_period).await {
            false
        } else {
            warn!("Listener worker {} ignored termination, killing it", pid);
            self.signal(pid, Signal::Kill)?;
            if !self.wait_for_exit(&worker, KILL_TIMEOUT).await {
                return Err(LifecycleError::Terminate {
                    pid,
                    reason: "still alive after forced termination".to_string(),
                });
            }
            true
        };
        info!("Listener worker {} stopped", pid);

        self.remove_tracking().await?;

        let merge = merge(&self.staging, &self.master).await?;
        Ok(StopOutcome::Stopped { pid, forced, merge })
    }

    fn spawn_worker(&self) -> Result<Child, LifecycleError> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| LifecycleError::Spawn(format!("cannot open {}: {}", self.log_path.display(), e)))?;
        let log_err = log
            .try_clone()
            .map_err(|e| LifecycleError::Spawn(e.to_string()))?;

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // Own process group: a terminal Ctrl-C aimed at us must not reach the worker
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().map_err(|e| {
            LifecycleError::Spawn(format!("{}: {}", self.command.program.display(), e))
        })
    }

    /// The tracked worker, if the record exists and still describes a live process.
    async fn live_worker(&mut self) -> Option<TrackingRecord> {
        let worker = self.read_tracking().await?;
        if self.is_alive(&worker) {
            Some(worker)
        } else {
            None
        }
    }

    fn is_alive(&mut self, worker: &TrackingRecord) -> bool {
        self.reap_child();

        let pid = Pid::from_u32(worker.pid);
        if !self.system.refresh_process(pid) {
            return false;
        }
        match self.system.process(pid) {
            Some(process) => {
                !matches!(process.status(), ProcessStatus::Zombie)
                    && process.start_time() == worker.start_time
            }
            None => false,
        }
    }

    fn process_start_time(&mut self, pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(|process| process.start_time())
    }

    /// Collect the exit status of our own child so it does not linger as a zombie.
    fn reap_child(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                debug!("Listener worker {} exited with {}", child.id(), status);
                self.child = None;
            }
        }
    }

    fn signal(&mut self, pid: u32, signal: Signal) -> Result<(), LifecycleError> {
        let sys_pid = Pid::from_u32(pid);
        if !self.system.refresh_process(sys_pid) {
            // Exited on its own in the meantime
            return Ok(());
        }
        let Some(process) = self.system.process(sys_pid) else {
            return Ok(());
        };

        let delivered = match process.kill_with(signal) {
            Some(delivered) => delivered,
            // Signal unsupported on this platform: fall back to a hard kill
            None => process.kill(),
        };

        if delivered {
            Ok(())
        } else {
            Err(LifecycleError::Terminate {
                pid,
                reason: format!("could not deliver {:?}", signal),
            })
        }
    }

    async fn wait_for_exit(&mut self, worker: &TrackingRecord, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive(worker) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(PROBE_INTERVAL).await;
        }
    }

    async fn read_tracking(&self) -> Option<TrackingRecord> {
        let contents = match tokio::fs::read_to_string(&self.tracking_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read tracking record {}: {}", self.tracking_path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!("Ignoring invalid tracking record {}: {}", self.tracking_path.display(), e);
                None
            }
        }
    }

    async fn write_tracking(&self, worker: &TrackingRecord) -> Result<(), LifecycleError> {
        let contents = serde_json::to_string(worker)
            .map_err(|e| self.tracking_error(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        tokio::fs::write(&self.tracking_path, contents)
            .await
            .map_err(|e| self.tracking_error(e))
    }

    async fn remove_tracking(&self) -> Result<(), LifecycleError> {
        match tokio::fs::remove_file(&self.tracking_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.tracking_error(e)),
        }
    }

    /// A record naming a dead or reused pid means the worker is gone; drop it.
    async fn clear_stale_tracking(&self) -> Result<(), LifecycleError> {
        if tokio::fs::try_exists(&self.tracking_path).await.unwrap_or(false) {
            info!("Removing stale tracking record {}", self.tracking_path.display());
            self.remove_tracking().await?;
        }
        Ok(())
    }

    fn tracking_error(&self, source: std::io::Error) -> LifecycleError {
        LifecycleError::Tracking {
            path: self.tracking_path.clone(),
            source,
        }
    }
}
