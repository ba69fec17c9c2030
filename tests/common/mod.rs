//! Shared integration-test helpers: spawning the fixture MCP server and
//! wiring a [`ProtocolHandler`] to an in-memory client-side duplex pipe, so
//! tests can write client bytes and read back what the proxy forwards
//! without touching the real process stdio.

use std::collections::HashMap;
use std::sync::Arc;

use mcp_dev_proxy::lifecycle::{ServerLifecycle, SpawnConfig};
use mcp_dev_proxy::protocol::ProtocolHandler;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Path to the `fake_mcp_server` fixture binary built alongside the crate.
pub fn fake_server_path() -> String {
    env!("CARGO_BIN_EXE_fake_mcp_server").to_string()
}

pub fn fake_server_spawn_config(env: HashMap<String, String>) -> SpawnConfig {
    SpawnConfig {
        command: fake_server_path(),
        args: vec![],
        cwd: None,
        env,
    }
}

/// A harness wiring a [`ProtocolHandler`] to one end of an in-memory duplex
/// pipe standing in for the real client stdin/stdout, and a
/// [`ServerLifecycle`] pointed at the fixture binary.
pub struct Harness {
    pub handler: Arc<ProtocolHandler>,
    pub lifecycle: Arc<ServerLifecycle>,
    client: DuplexStream,
}

impl Harness {
    pub fn new(env: HashMap<String, String>) -> Self {
        let (client, proxy_side) = tokio::io::duplex(64 * 1024);
        let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
        let handler = ProtocolHandler::attach(proxy_read, proxy_write);
        let lifecycle = Arc::new(ServerLifecycle::new(fake_server_spawn_config(env)));
        Self {
            handler,
            lifecycle,
            client,
        }
    }

    pub async fn send_client_line(&mut self, line: &str) {
        self.client.write_all(line.as_bytes()).await.unwrap();
        self.client.flush().await.unwrap();
    }

    /// Reads from the client side until at least one full `\n`-terminated
    /// line has arrived, then returns every complete line read so far.
    pub async fn read_client_lines(&mut self) -> Vec<String> {
        let mut buf = [0u8; 8192];
        let mut acc = Vec::new();
        loop {
            let n = self.client.read(&mut buf).await.unwrap();
            assert!(n > 0, "proxy stdout closed unexpectedly");
            acc.extend_from_slice(&buf[..n]);
            if acc.ends_with(b"\n") {
                break;
            }
        }
        String::from_utf8(acc)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
