//! Build Runner (spec §2 row E, §4.8): runs the configured shell command
//! and reports success/failure, cancellably.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub command: String,
    pub cwd: Option<PathBuf>,
}

/// Runs `command` through the platform shell (`sh -c` / `cmd /C`), capturing
/// output for logging rather than discarding it. An empty command is a
/// no-op success (spec §4.8).
pub struct BuildRunner {
    config: BuildConfig,
    current: Mutex<Option<Child>>,
}

impl BuildRunner {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
        }
    }

    /// Runs the build command to completion. Returns `true` on a zero exit
    /// status. If `cancel()` is called while this is in flight, the
    /// eventual result is discarded by the caller (spec §5) — `run` itself
    /// simply returns `false` once its child has been killed out from
    /// under it.
    pub async fn run(&self) -> Result<bool> {
        if self.config.command.trim().is_empty() {
            return Ok(true);
        }

        let mut command = shell_command(&self.config.command);
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();
        *self.current.lock().await = Some(child);

        // Poll rather than hold the lock across `wait()`, so `cancel()` can
        // reach in and kill the child concurrently (spec §5).
        let status = loop {
            let mut guard = self.current.lock().await;
            match guard.as_mut() {
                Some(child) => match child.try_wait()? {
                    Some(status) => break status,
                    None => {
                        drop(guard);
                        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
                    }
                },
                None => return Ok(false), // cancelled out from under us
            }
        };
        *self.current.lock().await = None;

        let ok = status.success();
        log_output("stdout", pid, stdout, ok).await;
        log_output("stderr", pid, stderr, ok).await;
        Ok(ok)
    }

    /// Aborts any in-flight build. A subsequent `run()` starts fresh.
    pub async fn cancel(&self) {
        if let Some(mut child) = self.current.lock().await.take() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

async fn log_output(
    stream: &str,
    pid: Option<u32>,
    handle: Option<impl tokio::io::AsyncRead + Unpin>,
    ok: bool,
) {
    let Some(mut handle) = handle else { return };
    let mut buf = Vec::new();
    use tokio::io::AsyncReadExt;
    if handle.read_to_end(&mut buf).await.is_err() {
        return;
    }
    buf.truncate(4096);
    if buf.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(&buf);
    if ok {
        debug!(pid, stream, "{text}");
    } else {
        warn!(pid, stream, "{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_command_succeeds_without_running_anything() {
        let runner = BuildRunner::new(BuildConfig {
            command: String::new(),
            cwd: None,
        });
        assert!(runner.run().await.unwrap());
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let runner = BuildRunner::new(BuildConfig {
            command: "true".to_string(),
            cwd: None,
        });
        assert!(runner.run().await.unwrap());
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let runner = BuildRunner::new(BuildConfig {
            command: "false".to_string(),
            cwd: None,
        });
        assert!(!runner.run().await.unwrap());
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_build() {
        let runner = std::sync::Arc::new(BuildRunner::new(BuildConfig {
            command: "sleep 5".to_string(),
            cwd: None,
        }));
        let r = runner.clone();
        let handle = tokio::spawn(async move { r.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        runner.cancel().await;
        let ok = handle.await.unwrap().unwrap();
        assert!(!ok);
    }
}
