//! Polls a freshly-spawned child for readiness before handing it to the
//! Protocol Handler.

use std::time::{Duration, Instant};

use tokio::process::Child;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct ReadinessConfig {
    pub check_interval_ms: u64,
    pub timeout_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 50,
            timeout_ms: 2000,
            settle_delay_ms: 100,
        }
    }
}

/// `tokio::process::ChildStdin` exposes no portable poll-for-writability
/// API, so "stdin writable" is approximated as "has not exited", checked
/// via non-blocking `try_wait`. See DESIGN.md for the recorded deviation.
///
/// Polls every `check_interval_ms` until the child is observed not-exited,
/// then waits `settle_delay_ms` and confirms it still holds before
/// resolving. Rejects if the child exits first, or if `timeout_ms` elapses
/// with no positive observation.
pub async fn wait_ready(child: &mut Child, cfg: &ReadinessConfig) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(cfg.timeout_ms);

    loop {
        if child.try_wait().map_err(Error::Io)?.is_some() {
            return Err(Error::ExitedDuringReadiness);
        }

        if Instant::now() >= deadline {
            return Err(Error::ReadinessTimeout(cfg.timeout_ms));
        }

        // Not exited: the first positive observation. Settle and confirm.
        tokio::time::sleep(Duration::from_millis(cfg.settle_delay_ms)).await;
        if child.try_wait().map_err(Error::Io)?.is_some() {
            return Err(Error::ExitedDuringReadiness);
        }
        return Ok(());
    }
}
