//! Minimal stand-in for a user-authored MCP server, used by the
//! integration tests to exercise the literal scenarios named in the
//! coordination engine's testable properties: a text tool-call round trip,
//! and a crash shortly after a successful initialize.
//!
//! Reads line-delimited JSON-RPC from stdin, replies on stdout. Blocking
//! I/O is enough here — the fixture has no concurrency of its own to
//! model.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use serde_json::{json, Value};

fn main() {
    let crash_after_ms: Option<u64> = std::env::var("FAKE_SERVER_CRASH_AFTER_INIT_MS")
        .ok()
        .and_then(|v| v.parse().ok());
    let crash_exit_code: i32 = std::env::var("FAKE_SERVER_CRASH_EXIT_CODE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    // Lets restart-counting tests observe each (re)spawn without needing a
    // pid channel back to the harness: one line appended per process start.
    if let Ok(marker_path) = std::env::var("FAKE_SERVER_STARTUP_MARKER") {
        use std::io::Write as _;
        if let Ok(mut f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker_path)
        {
            let _ = writeln!(f, "{}", std::process::id());
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let id = value.get("id").cloned();
        let method = value.get("method").and_then(Value::as_str);

        match method {
            Some("initialize") => {
                write_line(
                    &mut stdout,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": { "protocolVersion": "2024-11-05", "capabilities": {} },
                    }),
                );

                if let Some(ms) = crash_after_ms {
                    std::thread::sleep(Duration::from_millis(ms));
                    std::process::exit(crash_exit_code);
                }
            }
            Some("tools/call") => {
                let message = value
                    .pointer("/params/arguments/message")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                write_line(
                    &mut stdout,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": { "content": [{ "type": "text", "text": message }] },
                    }),
                );
            }
            _ => {
                if id.is_some() {
                    write_line(&mut stdout, &json!({ "jsonrpc": "2.0", "id": id, "result": {} }));
                }
            }
        }
    }
}

fn write_line(stdout: &mut io::Stdout, value: &Value) {
    let mut line = serde_json::to_vec(value).expect("fixture response always serializes");
    line.push(b'\n');
    let _ = stdout.write_all(&line);
    let _ = stdout.flush();
}
