//! Wires Server Lifecycle, Protocol Handler, and the hot-reload loop (spec
//! §2 row J, §4.6, §5, §6). Owns process-level signal handling and the
//! single "exit once" shutdown latch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::build::{BuildConfig, BuildRunner};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::{ServerLifecycle, SpawnConfig};
use crate::protocol::ProtocolHandler;
use crate::watch::{FileWatcher, WatchConfig};

/// The environment variable the proxy sets on its child and inspects on its
/// own startup (spec §6). Generated once per process.
pub const INSTANCE_ENV_VAR: &str = "MCP_PROXY_INSTANCE";

static INSTANCE_TOKEN: Lazy<String> = Lazy::new(|| uuid::Uuid::new_v4().to_string());

/// Entry point used by `main`. If `MCP_PROXY_INSTANCE` is already set in the
/// environment, this proxy is nested under another one and degenerates into
/// a byte-for-byte pass-through (spec §6's recursion guard). Otherwise runs
/// the full coordination engine.
pub async fn run(config: Config) -> Result<()> {
    if std::env::var(INSTANCE_ENV_VAR).is_ok() {
        warn!("MCP_PROXY_INSTANCE already set, degenerating into pass-through to avoid recursive nesting");
        return run_passthrough(&config).await;
    }
    Orchestrator::new(config).run().await
}

/// A minimal direct pipe between this process's stdio and a directly
/// spawned child, with no build runner, watcher, or restart logic. The
/// child is still launched with a freshly generated instance token so a
/// chain of nested proxies terminates after one extra hop.
async fn run_passthrough(config: &Config) -> Result<()> {
    let mut command = Command::new(&config.server_command);
    command.args(&config.server_args);
    command
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true);
    if !config.cwd.as_os_str().is_empty() {
        command.current_dir(&config.cwd);
    }
    for (key, value) in &config.env {
        command.env(key, value);
    }
    command.env(INSTANCE_ENV_VAR, INSTANCE_TOKEN.as_str());

    let mut child: Child = command
        .spawn()
        .map_err(|e| Error::Startup(format!("pass-through spawn failed: {e}")))?;
    let mut child_stdin = child.stdin.take().expect("piped stdin");
    let mut child_stdout = child.stdout.take().expect("piped stdout");

    let to_child = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let _ = tokio::io::copy(&mut stdin, &mut child_stdin).await;
    });
    let to_client = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        let _ = tokio::io::copy(&mut child_stdout, &mut stdout).await;
    });

    let _ = child.wait().await;
    to_child.abort();
    to_client.abort();
    Ok(())
}

/// Wires the Server Lifecycle, the Protocol Handler, and the hot-reload
/// loop (spec §4.6's pseudocode, made concrete).
///
/// Every field is reachable through a public accessor so integration tests
/// can drive the hot-reload cycle and assert spec §8's testable properties
/// (debounce coalescing, build-failure resilience, no concurrent cycles)
/// without going through the process's real stdio or signal handling —
/// [`Orchestrator::with_io`] injects the client streams instead.
pub struct Orchestrator {
    #[allow(dead_code)]
    config: Config,
    protocol: Arc<ProtocolHandler>,
    lifecycle: Arc<ServerLifecycle>,
    build_runner: Arc<BuildRunner>,
    watcher: Arc<FileWatcher>,
    restart_in_progress: Arc<AtomicBool>,
}

impl Orchestrator {
    fn new(config: Config) -> Self {
        Self::with_io(config, tokio::io::stdin(), tokio::io::stdout())
    }

    /// Builds an Orchestrator with the Protocol Handler attached to
    /// caller-supplied client streams instead of the process's real
    /// stdin/stdout.
    pub fn with_io<R, W>(config: Config, client_in: R, client_out: W) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let mut env: HashMap<String, String> = config.env.clone();
        env.insert(INSTANCE_ENV_VAR.to_string(), INSTANCE_TOKEN.clone());

        let spawn_cfg = SpawnConfig {
            command: config.server_command.clone(),
            args: config.server_args.clone(),
            cwd: cwd_or_none(&config.cwd),
            env,
        };
        let build_cfg = BuildConfig {
            command: config.build_command.clone(),
            cwd: cwd_or_none(&config.cwd),
        };
        let watch_cfg = WatchConfig {
            patterns: config.watch_patterns.clone(),
            cwd: config.cwd.clone(),
            debounce_ms: config.debounce_ms,
            extensions: crate::watch::default_extensions(),
        };

        let protocol = ProtocolHandler::attach(client_in, client_out);

        Self {
            config,
            protocol,
            lifecycle: Arc::new(ServerLifecycle::new(spawn_cfg)),
            build_runner: Arc::new(BuildRunner::new(build_cfg)),
            watcher: Arc::new(FileWatcher::new(watch_cfg)),
            restart_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn protocol(&self) -> &Arc<ProtocolHandler> {
        &self.protocol
    }

    pub fn lifecycle(&self) -> &Arc<ServerLifecycle> {
        &self.lifecycle
    }

    pub fn build_runner(&self) -> &Arc<BuildRunner> {
        &self.build_runner
    }

    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.watcher
    }

    pub fn is_restart_in_progress(&self) -> bool {
        self.restart_in_progress.load(Ordering::SeqCst)
    }

    /// Performs the initial `lifecycle.start()` + `connect_server`, per
    /// spec §2's data-flow: the first child is up before the hot-reload
    /// loop or the client-facing reader has anything to route to.
    pub async fn start_initial(&self) -> Result<()> {
        self.watcher.start()?;
        let conn = self.lifecycle.start().await?;
        self.protocol.connect_server(conn).await;
        Ok(())
    }

    async fn run(self) -> Result<()> {
        self.start_initial().await?;

        let this = Arc::new(self);
        let hot_reload = tokio::spawn(this.clone().spawn_hot_reload_loop());

        let (shutdown_tx, _) = broadcast::channel(1);
        setup_signal_handlers(shutdown_tx.clone());
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutdown signal received");
            }
            _ = this.protocol.wait_client_closed() => {
                info!("client stdin closed");
            }
        }

        hot_reload.abort();
        this.protocol.shutdown().await;
        this.watcher.stop();
        Ok(())
    }

    /// spec §4.6's pseudocode, made concurrent: the wait for the next
    /// change is never blocked behind a cycle currently running, so a
    /// change observed mid-cycle is correctly dropped by
    /// `restart_in_progress` rather than queued for later. Public so
    /// integration tests can exercise the real debounce-driven loop
    /// end-to-end; `main` spawns it as a background task.
    pub async fn spawn_hot_reload_loop(self: Arc<Self>) {
        loop {
            let changed = self.watcher.wait_for_change().await;
            if self.restart_in_progress.swap(true, Ordering::SeqCst) {
                debug!(?changed, "restart already in progress, dropping duplicate trigger");
                continue;
            }
            let this = self.clone();
            tokio::spawn(async move {
                this.run_cycle(changed).await;
                this.restart_in_progress.store(false, Ordering::SeqCst);
            });
        }
    }

    /// One hot-reload cycle: build, then (on success) disconnect, restart,
    /// reconnect, and notify the client if the session had been
    /// initialized. Public for integration tests that want to trigger a
    /// cycle directly without waiting on the real file watcher.
    pub async fn run_cycle(&self, changed: Vec<PathBuf>) {
        info!(?changed, "file change detected, running build");
        match self.build_runner.run().await {
            Ok(true) => self.restart_after_build().await,
            Ok(false) => warn!("build failed, keeping current server"),
            Err(e) => error!(error = %e, "build runner failed to launch"),
        }
    }

    async fn restart_after_build(&self) {
        let was_initialized = self.protocol.session_state().await.initialized;
        self.protocol.disconnect_server().await;

        match self.lifecycle.restart().await {
            Ok(conn) => {
                info!(pid = conn.pid(), "restart succeeded");
                self.protocol.connect_server(conn).await;
                if was_initialized {
                    self.protocol.notify_tools_list_changed().await;
                }
            }
            Err(e) => {
                // Propagated per spec §7: log and continue the loop so the
                // next save can retry. The client keeps queuing until then.
                error!(error = %e, "restart failed, will retry on next change");
            }
        }
    }
}

fn cwd_or_none(path: &std::path::Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() || path == std::path::Path::new(".") {
        None
    } else {
        Some(path.to_path_buf())
    }
}

/// Subscribes to SIGTERM/SIGINT (Ctrl-C on Windows) and trips the single
/// "exit once" latch described in spec §5 — the proxy does not attempt a
/// graceful protocol shutdown in the signal path, matching the teacher's
/// `daemon::signals::setup_signal_handlers` shape.
#[cfg(unix)]
fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        let _ = shutdown_tx.send(());
    });
}

#[cfg(windows)]
fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("received Ctrl+C");
        let _ = shutdown_tx.send(());
    });
}
