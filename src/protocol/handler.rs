//! The Protocol Handler: the routing and recovery brain (spec §2 row I,
//! §4.4). Owns session state and the priority queue, attaches to the
//! client's stdin/stdout once at construction, and connects/disconnects a
//! [`Connection`] to the currently running server.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::lifecycle::Connection;

use super::message::{crash_error_response, tools_list_changed_notification, CrashInfo};
use super::parser::FrameParser;
use super::queue::PriorityQueue;
use super::session::SessionState;

const READ_CHUNK: usize = 8192;

struct State {
    session: SessionState,
    queue: PriorityQueue,
    connection: Option<Arc<Connection>>,
}

/// Snapshot of session state for observability (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot {
    pub initialized: bool,
    pub has_initialize_request: bool,
    pub has_pending_request: bool,
}

pub struct ProtocolHandler {
    state: AsyncMutex<State>,
    client_out: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    client_reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    server_reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    crash_watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Flips to `true` once the client stdin reader sees EOF or an error —
    /// the Orchestrator's "exit once" latch also trips on this (spec §5).
    client_closed_tx: watch::Sender<bool>,
    client_closed_rx: watch::Receiver<bool>,
}

impl ProtocolHandler {
    /// Attaches to the client's stdin/stdout. Spawns the reader task for
    /// client stdin immediately; it runs for the lifetime of the handler
    /// until `shutdown()` aborts it.
    #[instrument(skip_all)]
    pub fn attach<R, W>(client_in: R, client_out: W) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (client_closed_tx, client_closed_rx) = watch::channel(false);
        let handler = Arc::new(Self {
            state: AsyncMutex::new(State {
                session: SessionState::new(),
                queue: PriorityQueue::new(),
                connection: None,
            }),
            client_out: AsyncMutex::new(Box::new(client_out)),
            client_reader: std::sync::Mutex::new(None),
            server_reader: std::sync::Mutex::new(None),
            crash_watcher: std::sync::Mutex::new(None),
            client_closed_tx,
            client_closed_rx,
        });

        let reader_handler = handler.clone();
        let task = tokio::spawn(async move { reader_handler.run_client_reader(client_in).await });
        *handler.client_reader.lock().unwrap() = Some(task);

        handler
    }

    async fn run_client_reader<R>(self: Arc<Self>, mut client_in: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = match client_in.read(&mut buf).await {
                Ok(0) => {
                    info!("client stdin closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "client stdin read error");
                    break;
                }
            };
            for frame in parser.feed(&buf[..n]) {
                let is_initialize = frame.parsed.as_ref().is_some_and(|p| p.is_initialize());
                let priority = frame.parsed.as_ref().map_or(10, |p| p.priority());
                if let Some(parsed) = &frame.parsed {
                    let mut state = self.state.lock().await;
                    state.session.on_client_message(parsed, &frame.raw);
                } else {
                    debug!("non-JSON line from client, forwarding raw");
                }
                self.route_to_server(frame.raw, is_initialize, priority)
                    .await;
            }
        }
        let _ = self.client_closed_tx.send(true);
    }

    /// Resolves once the client stdin reader has exited (EOF or error).
    pub async fn wait_client_closed(&self) {
        let mut rx = self.client_closed_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Routing algorithm, client → server (spec §4.4).
    async fn route_to_server(&self, raw: Bytes, is_initialize: bool, priority: u8) {
        let (conn, must_queue) = {
            let state = self.state.lock().await;
            match &state.connection {
                Some(conn) if conn.is_alive() => {
                    let must_queue = !state.session.initialized() && !is_initialize;
                    (Some(conn.clone()), must_queue)
                }
                _ => (None, true),
            }
        };

        if must_queue {
            self.state.lock().await.queue.push(raw, priority);
            return;
        }

        let Some(conn) = conn else { return };
        if let Err(e) = conn.write_stdin(&raw).await {
            warn!(error = %e, "write to server stdin failed, queueing for reconnect");
            self.state.lock().await.queue.push(raw, priority);
        }
    }

    /// Installs `conn` as current. Disconnects any previous connection
    /// first, replays the cached initialize request unconditionally, then
    /// drains the priority queue in priority order (spec §4.4, §8
    /// invariant 3).
    #[instrument(skip(self, conn), fields(pid = conn.pid()))]
    pub async fn connect_server(self: &Arc<Self>, conn: Arc<Connection>) {
        self.disconnect_server().await;

        let stdout = conn.take_stdout().await;

        // Install the connection and force the session back to
        // uninitialized in the same lock acquisition: a freshly attached
        // child has not completed the handshake yet, even though the
        // client-visible session continues. Doing this atomically closes
        // the window in which the independent client-reader task could see
        // `connection = Some(..)` alongside a stale `initialized = true`
        // and forward an ordinary request directly, racing the cached
        // initialize replay below on the same stdin (spec §5, §8
        // invariant 3).
        let initialize_request = {
            let mut state = self.state.lock().await;
            state.connection = Some(conn.clone());
            state.session.force_uninitialized();
            state.session.initialize_request().cloned()
        };

        if let Some(raw) = &initialize_request {
            if let Err(e) = conn.write_stdin(raw).await {
                warn!(error = %e, "failed to replay cached initialize request to new server");
            }
        }

        let drained = { self.state.lock().await.queue.drain() };
        for (raw, priority) in drained {
            if let Err(e) = conn.write_stdin(&raw).await {
                warn!(error = %e, "failed to flush queued frame to new server, re-queueing");
                self.state.lock().await.queue.push(raw, priority);
            }
        }

        if let Some(stdout) = stdout {
            let reader_handler = self.clone();
            let reader_conn = conn.clone();
            let task = tokio::spawn(async move {
                reader_handler.run_server_reader(stdout, reader_conn).await
            });
            *self.server_reader.lock().unwrap() = Some(task);
        }

        let crash_handler = self.clone();
        let crash_conn = conn.clone();
        let task = tokio::spawn(async move {
            let info = crash_conn.wait_for_crash().await;
            if !crash_conn.is_disposed() {
                crash_handler.handle_server_crash(info).await;
            }
        });
        *self.crash_watcher.lock().unwrap() = Some(task);
    }

    async fn run_server_reader(
        self: Arc<Self>,
        mut stdout: impl AsyncRead + Unpin + Send + 'static,
        conn: Arc<Connection>,
    ) {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if conn.is_disposed() {
                break;
            }
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "server stdout read error");
                    break;
                }
            };
            for frame in parser.feed(&buf[..n]) {
                if let Some(parsed) = &frame.parsed {
                    let mut state = self.state.lock().await;
                    state.session.on_server_message(parsed);
                } else {
                    debug!("non-JSON line from server, forwarding raw");
                }
                self.write_client(&frame.raw).await;
            }
        }
    }

    /// Detaches the reader + crash listener and disposes the current
    /// connection. Idempotent.
    #[instrument(skip(self))]
    pub async fn disconnect_server(&self) {
        let conn = self.state.lock().await.connection.take();
        if let Some(task) = self.server_reader.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.crash_watcher.lock().unwrap().take() {
            task.abort();
        }
        if let Some(conn) = conn {
            conn.dispose();
        }
    }

    /// Synthesizes a crash error response for the current pending request
    /// (if any) and disconnects. Idempotent per connection: a disposed
    /// connection's crash watcher never calls this (see `connect_server`).
    #[instrument(skip(self))]
    pub async fn handle_server_crash(&self, info: CrashInfo) {
        let response = {
            let mut state = self.state.lock().await;
            let pending = state.session.pending_request().cloned();
            state.session.clear_pending();
            pending.map(|p| crash_error_response(&p, info))
        };

        match response {
            Some(resp) => {
                error!(?info, "server crashed with a request in flight, synthesizing error");
                self.write_client(&resp).await;
            }
            None => warn!(?info, "server crashed with no pending request"),
        }

        self.disconnect_server().await;
    }

    /// Emits the `notifications/tools/list_changed` notification, used by
    /// the hot-reload loop after a restart that follows an initialized
    /// session (spec §4.6, §6).
    pub async fn notify_tools_list_changed(&self) {
        self.write_client(&tools_list_changed_notification()).await;
    }

    async fn write_client(&self, raw: &[u8]) {
        let mut out = self.client_out.lock().await;
        if let Err(e) = out.write_all(raw).await {
            warn!(error = %e, "write to client stdout failed");
            return;
        }
        if let Err(e) = out.flush().await {
            warn!(error = %e, "flush to client stdout failed");
        }
    }

    /// Disconnects, stops the client reader, and resets session + queue
    /// (spec §4.4).
    pub async fn shutdown(&self) {
        self.disconnect_server().await;
        if let Some(task) = self.client_reader.lock().unwrap().take() {
            task.abort();
        }
        let mut state = self.state.lock().await;
        state.session.reset();
        state.queue.clear();
    }

    pub async fn session_state(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            initialized: state.session.initialized(),
            has_initialize_request: state.session.initialize_request().is_some(),
            has_pending_request: state.session.pending_request().is_some(),
        }
    }

    pub async fn queue_size(&self) -> usize {
        self.state.lock().await.queue.size()
    }
}
