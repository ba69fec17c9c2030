//! OS-signal based termination with a grace period, escalating to a kill.
//!
//! Operates purely on pid + a shared liveness flag so it never needs
//! mutable access to the `tokio::process::Child` — that stays owned by the
//! exit-watcher task spawned in [`super::ServerLifecycle::start`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct TerminationConfig {
    pub grace_ms: u64,
    pub force_after_ms: u64,
    pub hard_zombie_after_ms: u64,
}

impl TerminationConfig {
    /// Tuned for speed, per spec §4.5's restart sequence.
    pub const RESTART: Self = Self {
        grace_ms: 0,
        force_after_ms: 100,
        hard_zombie_after_ms: 500,
    };
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self::RESTART
    }
}

/// Sends SIGTERM, waits up to `force_after_ms` for exit, escalates to
/// SIGKILL, then waits up to the remainder of `hard_zombie_after_ms`. Errors
/// with [`Error::TerminationTimeout`] if the child is still alive after
/// that.
pub async fn terminate(pid: u32, alive: &Arc<AtomicBool>, cfg: &TerminationConfig) -> Result<()> {
    if cfg.grace_ms > 0 {
        tokio::time::sleep(Duration::from_millis(cfg.grace_ms)).await;
    }
    if !alive.load(Ordering::SeqCst) {
        return Ok(());
    }

    let nix_pid = Pid::from_raw(pid as i32);
    if signal::kill(nix_pid, Signal::SIGTERM).is_err() {
        return Ok(());
    }
    if wait_until_dead(alive, cfg.force_after_ms).await {
        return Ok(());
    }

    warn!(pid, "server did not exit after SIGTERM, sending SIGKILL");
    let _ = signal::kill(nix_pid, Signal::SIGKILL);
    let remaining = cfg.hard_zombie_after_ms.saturating_sub(cfg.force_after_ms);
    if wait_until_dead(alive, remaining).await {
        return Ok(());
    }

    Err(Error::TerminationTimeout)
}

async fn wait_until_dead(alive: &Arc<AtomicBool>, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut interval = tokio::time::interval(Duration::from_millis(10));
    loop {
        if !alive.load(Ordering::SeqCst) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        interval.tick().await;
    }
}
