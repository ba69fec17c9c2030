//! Server Lifecycle (spec §2 row H, §4.5): spawns, probes readiness, and
//! terminates the single child process, handing back a [`Connection`] to
//! whoever asked. Enforces "at most one live child at a time" and
//! serializes `start`/`restart` against each other so a `restart` invoked
//! while a `start` is still blocked in readiness cannot race it (spec §5).

pub mod connection;
pub mod readiness;
pub mod termination;

pub use connection::Connection;
pub use readiness::ReadinessConfig;
pub use termination::TerminationConfig;

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::protocol::message::CrashInfo;

/// How to launch the child, per spec §6's configuration surface.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

struct ChildHandle {
    pid: u32,
    alive: Arc<AtomicBool>,
    terminating: Arc<AtomicBool>,
    watcher: tokio::task::JoinHandle<()>,
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

pub struct ServerLifecycle {
    spawn_cfg: SpawnConfig,
    readiness_cfg: ReadinessConfig,
    restart_termination_cfg: TerminationConfig,
    /// Serializes `start`/`restart` transitions (spec §5 cancellation note).
    transition: Mutex<()>,
    child: Mutex<Option<ChildHandle>>,
}

impl ServerLifecycle {
    pub fn new(spawn_cfg: SpawnConfig) -> Self {
        Self {
            spawn_cfg,
            readiness_cfg: ReadinessConfig::default(),
            restart_termination_cfg: TerminationConfig::RESTART,
            transition: Mutex::new(()),
            child: Mutex::new(None),
        }
    }

    pub fn with_readiness(mut self, cfg: ReadinessConfig) -> Self {
        self.readiness_cfg = cfg;
        self
    }

    pub fn with_restart_termination(mut self, cfg: TerminationConfig) -> Self {
        self.restart_termination_cfg = cfg;
        self
    }

    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Spawns the child, waits for readiness, and returns a [`Connection`].
    /// Fails with [`Error::AlreadyRunning`] if a child is already tracked.
    #[instrument(skip(self), fields(command = %self.spawn_cfg.command))]
    pub async fn start(&self) -> Result<Arc<Connection>> {
        let _guard = self.transition.lock().await;
        self.start_locked().await
    }

    /// Terminates any current child (clearing the reference first, so its
    /// exit handler does not log it as a crash) and starts a fresh one.
    /// Atomic from the caller's standpoint: on failure, no partially
    /// initialized state is left behind.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<Arc<Connection>> {
        let _guard = self.transition.lock().await;
        info!("restarting: terminating current child, if any"); // Running -> Restarting
        let previous = self.child.lock().await.take();
        if let Some(handle) = previous {
            handle.terminating.store(true, Ordering::SeqCst);
            termination::terminate(handle.pid, &handle.alive, &self.restart_termination_cfg)
                .await?;
        }
        self.start_locked().await // Restarting -> Starting -> Running
    }

    async fn start_locked(&self) -> Result<Arc<Connection>> {
        {
            let slot = self.child.lock().await;
            if slot.is_some() {
                return Err(Error::AlreadyRunning);
            }
        }

        info!("spawning server"); // Idle -> Starting
        let mut command = Command::new(&self.spawn_cfg.command);
        command
            .args(&self.spawn_cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.spawn_cfg.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.spawn_cfg.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::Startup(format!("failed to spawn {}: {e}", self.spawn_cfg.command)))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Startup("child exited before it could be observed".into()))?;

        if let Err(e) = readiness::wait_ready(&mut child, &self.readiness_cfg).await {
            warn!(pid, error = %e, "server failed readiness check, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(e);
        }
        info!(pid, "server ready"); // Starting -> Running

        let stdin = child.stdin.take().expect("spawned with piped stdin");
        let stdout = child.stdout.take().expect("spawned with piped stdout");

        let alive = Arc::new(AtomicBool::new(true));
        let terminating = Arc::new(AtomicBool::new(false));
        let (crash_tx, crash_rx) = watch::channel(None);

        let watcher_alive = alive.clone();
        let watcher_terminating = terminating.clone();
        let watcher = tokio::spawn(async move {
            let status = child.wait().await;
            watcher_alive.store(false, Ordering::SeqCst);
            let info = match status {
                Ok(status) => CrashInfo {
                    code: status.code(),
                    signal: status.signal(),
                },
                Err(_) => CrashInfo::default(),
            };
            if watcher_terminating.load(Ordering::SeqCst) {
                debug!(pid, "child exited after solicited termination");
            } else {
                warn!(pid, ?info, "child exited unexpectedly");
            }
            let _ = crash_tx.send(Some(info));
        });

        let connection = Arc::new(Connection::new(pid, stdin, stdout, alive.clone(), crash_rx));

        *self.child.lock().await = Some(ChildHandle {
            pid,
            alive,
            terminating,
            watcher,
        });

        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_config() -> SpawnConfig {
        SpawnConfig {
            command: "cat".to_string(),
            args: vec![],
            cwd: None,
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn start_then_start_fails_already_running() {
        let lifecycle = ServerLifecycle::new(echo_config());
        let _conn = lifecycle.start().await.unwrap();
        let err = lifecycle.start().await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning));
    }

    #[tokio::test]
    async fn restart_clears_and_respawns() {
        let lifecycle = ServerLifecycle::new(echo_config());
        let first = lifecycle.start().await.unwrap();
        let second = lifecycle.restart().await.unwrap();
        assert_ne!(first.pid(), second.pid());
        assert!(lifecycle.is_running().await);
    }

    #[tokio::test]
    async fn start_fails_when_command_missing() {
        let lifecycle = ServerLifecycle::new(SpawnConfig {
            command: "definitely-not-a-real-binary-xyz".to_string(),
            args: vec![],
            cwd: None,
            env: HashMap::new(),
        });
        assert!(lifecycle.start().await.is_err());
        assert!(!lifecycle.is_running().await);
    }
}
