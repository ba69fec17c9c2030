//! Error types for mcp-dev-proxy.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds the coordination engine distinguishes. Each carries the
/// recovery policy assigned to it in spec §7 — forward raw bytes, queue and
/// await reconnect, propagate to the orchestrator, or exit.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server already running")]
    AlreadyRunning,

    #[error("failed to start server: {0}")]
    Startup(String),

    #[error("server did not become ready within {0}ms")]
    ReadinessTimeout(u64),

    #[error("server exited during readiness check")]
    ExitedDuringReadiness,

    #[error("server did not terminate within the configured grace window")]
    TerminationTimeout,

    #[error("no server connection is currently attached")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
