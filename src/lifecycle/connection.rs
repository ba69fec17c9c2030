//! The handle the Protocol Handler uses to talk to the current child:
//! stdin/stdout, pid, liveness, and a one-shot crash notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};
use crate::protocol::message::CrashInfo;

/// Owns the downstream-to-child write side and the distributed liveness
/// flag. Reading `stdout` happens on whoever calls [`Connection::take_stdout`]
/// — exactly one caller, per spec (the Protocol Handler's reader task).
pub struct Connection {
    pid: u32,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<Option<ChildStdout>>,
    alive: Arc<AtomicBool>,
    crash_rx: watch::Receiver<Option<CrashInfo>>,
    disposed: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        pid: u32,
        stdin: ChildStdin,
        stdout: ChildStdout,
        alive: Arc<AtomicBool>,
        crash_rx: watch::Receiver<Option<CrashInfo>>,
    ) -> Self {
        Self {
            pid,
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(Some(stdout)),
            alive,
            crash_rx,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Takes ownership of the stdout reader; returns `None` if already
    /// taken. Called once, by whoever attaches a reader loop to this
    /// connection.
    pub async fn take_stdout(&self) -> Option<ChildStdout> {
        self.stdout.lock().await.take()
    }

    pub async fn write_stdin(&self, raw: &[u8]) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(raw).await.map_err(Error::Io)?;
        stdin.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    /// Resolves when the child exits. Safe to call repeatedly (returns the
    /// same completed value) and safe to never await (the underlying
    /// `watch` channel holds no listener-side resources).
    pub async fn wait_for_crash(&self) -> CrashInfo {
        let mut rx = self.crash_rx.clone();
        loop {
            if let Some(info) = *rx.borrow() {
                return info;
            }
            if rx.changed().await.is_err() {
                return CrashInfo::default();
            }
        }
    }

    /// Detaches the crash listener and frees this handle's resources.
    /// Idempotent. Does not kill the process — the exit-watcher task
    /// backing `alive`/`wait_for_crash` keeps running so the process is
    /// still reaped when it does exit.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
