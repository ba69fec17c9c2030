//! Wire-level JSON-RPC message shapes.
//!
//! Messages are never re-serialized for forwarding — only inspected for
//! routing and session-tracking decisions. `raw` always carries the exact
//! bytes (including the trailing newline) that arrived on the wire.

use bytes::Bytes;
use serde_json::Value;

/// A single line-delimited JSON-RPC frame.
///
/// `parsed` is `None` when the line was not valid JSON; the frame is still
/// forwarded verbatim in that case, it just carries no routable shape.
#[derive(Debug, Clone)]
pub struct Frame {
    pub raw: Bytes,
    pub parsed: Option<ParsedMessage>,
}

impl Frame {
    pub fn unparsed(raw: Bytes) -> Self {
        Self { raw, parsed: None }
    }

    pub fn parsed(raw: Bytes, parsed: ParsedMessage) -> Self {
        Self {
            raw,
            parsed: Some(parsed),
        }
    }
}

/// A JSON-RPC message shape derived from the presence of `id`/`method`/
/// `result`/`error`, per spec §3. Kept deliberately loose — fields are not
/// validated beyond what routing and session tracking need.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub id: Option<Value>,
    pub method: Option<String>,
    pub has_result: bool,
    pub has_error: bool,
    pub value: Value,
}

impl ParsedMessage {
    pub fn from_value(value: Value) -> Self {
        let id = value.get("id").cloned();
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let has_result = value.get("result").is_some();
        let has_error = value.get("error").is_some();
        Self {
            id,
            method,
            has_result,
            has_error,
            value,
        }
    }

    /// A request carries both an id and a method.
    pub fn is_request(&self) -> bool {
        self.id.is_some() && self.method.is_some()
    }

    /// A notification has a method but no id.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    pub fn is_initialize(&self) -> bool {
        self.method.as_deref() == Some("initialize")
    }

    pub fn priority(&self) -> u8 {
        if self.is_initialize() {
            100
        } else if self.is_request() {
            50
        } else {
            10
        }
    }
}

/// Exit information carried by a server crash notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrashInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// The fixed pending-request shape tracked by Session State.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Value,
    pub method: String,
}

pub fn tools_list_changed_notification() -> Bytes {
    Bytes::from_static(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}\n")
}

/// Build the synthesized crash error response for a pending request, per
/// spec §4.4.
pub fn crash_error_response(pending: &PendingRequest, crash: CrashInfo) -> Bytes {
    let message = format!(
        "{}{}",
        describe_crash(crash),
        " Hot-reload will attempt to restart on next file change."
    );
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": pending.id,
        "error": {
            "code": -32603,
            "message": message,
            "data": {
                "exitCode": crash.code,
                "signal": crash.signal,
                "method": pending.method,
                "info": "Save a file to trigger rebuild and restart.",
            }
        }
    });
    let mut line = serde_json::to_vec(&body).expect("crash response always serializes");
    line.push(b'\n');
    Bytes::from(line)
}

fn describe_crash(crash: CrashInfo) -> String {
    if let Some(signal) = crash.signal {
        let phrase = match signal {
            11 => "segmentation fault",
            9 => "killed forcefully — possible OOM or manual termination",
            15 => "terminated — shutdown requested",
            2 => "interrupted",
            other => return format!("terminated unexpectedly (signal: {other})."),
        };
        return format!("terminated unexpectedly: {phrase}.");
    }
    match crash.code {
        Some(1) => "terminated unexpectedly: general error.".to_string(),
        Some(127) => "terminated unexpectedly: command not found.".to_string(),
        Some(130) => "terminated unexpectedly: Ctrl+C.".to_string(),
        Some(137) => "terminated unexpectedly: killed (likely OOM).".to_string(),
        Some(143) => "terminated unexpectedly: SIGTERM.".to_string(),
        Some(other) => format!("terminated unexpectedly (exit code {other})."),
        None => "terminated unexpectedly.".to_string(),
    }
}
