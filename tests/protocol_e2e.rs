//! End-to-end protocol scenarios for the coordination engine (spec.md §8's
//! literal test seeds 1, 5, and 6): a text tool-call round trip through a
//! live child, a crash shortly after a successful initialize, and session
//! replay across a manual restart.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::Harness;
use serde_json::Value;

fn parse_line(line: &str) -> Value {
    serde_json::from_str(line).expect("forwarded line is valid JSON")
}

#[tokio::test]
async fn text_tool_call_round_trip() {
    let mut harness = Harness::new(HashMap::new());
    let conn = harness.lifecycle.start().await.unwrap();
    harness.handler.connect_server(conn).await;

    harness
        .send_client_line("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n")
        .await;
    let init_lines = harness.read_client_lines().await;
    let init_response = parse_line(&init_lines[0]);
    assert_eq!(init_response["id"], 1);
    assert!(init_response.get("result").is_some());

    harness
        .send_client_line(
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"getText\",\"arguments\":{\"message\":\"Custom text message\"}}}\n",
        )
        .await;
    let call_lines = harness.read_client_lines().await;
    let call_response = parse_line(&call_lines[0]);
    assert_eq!(call_response["id"], 2);
    assert_eq!(call_response["result"]["content"][0]["type"], "text");
    assert_eq!(
        call_response["result"]["content"][0]["text"],
        "Custom text message"
    );
}

#[tokio::test]
async fn crash_after_init_synthesizes_error_for_pending_request() {
    let mut env = HashMap::new();
    env.insert("FAKE_SERVER_CRASH_AFTER_INIT_MS".to_string(), "100".to_string());
    env.insert("FAKE_SERVER_CRASH_EXIT_CODE".to_string(), "1".to_string());

    let mut harness = Harness::new(env);
    let conn = harness.lifecycle.start().await.unwrap();
    harness.handler.connect_server(conn).await;

    harness
        .send_client_line("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n")
        .await;
    let init_lines = harness.read_client_lines().await;
    assert_eq!(parse_line(&init_lines[0])["id"], 1);

    harness
        .send_client_line("{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"test\"}}\n")
        .await;

    let crash_lines = tokio::time::timeout(Duration::from_millis(500), harness.read_client_lines())
        .await
        .expect("crash error should arrive within 500ms");
    let crash_response = parse_line(&crash_lines[0]);
    assert_eq!(crash_response["id"], 2);
    assert_eq!(crash_response["error"]["code"], -32603);
    assert!(crash_response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("terminated unexpectedly"));
    assert_eq!(crash_response["error"]["data"]["exitCode"], 1);
}

#[tokio::test]
async fn session_replays_initialize_on_reconnect() {
    let mut harness = Harness::new(HashMap::new());
    let first = harness.lifecycle.start().await.unwrap();
    harness.handler.connect_server(first).await;

    harness
        .send_client_line("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n")
        .await;
    let init_lines = harness.read_client_lines().await;
    assert_eq!(parse_line(&init_lines[0])["id"], 1);
    assert!(harness.handler.session_state().await.initialized);

    // Simulate the hot-reload loop's restart: disconnect, start a fresh
    // child, reconnect. The new child must see the cached initialize
    // request as its first stdin bytes and answer it, re-initializing the
    // session for the continuing client.
    harness.handler.disconnect_server().await;
    let second = harness.lifecycle.restart().await.unwrap();
    harness.handler.connect_server(second).await;

    let replay_lines = harness.read_client_lines().await;
    let replay_response = parse_line(&replay_lines[0]);
    assert_eq!(replay_response["id"], 1);
    assert!(replay_response.get("result").is_some());
    assert!(harness.handler.session_state().await.initialized);

    harness.handler.notify_tools_list_changed().await;
    let notif_lines = harness.read_client_lines().await;
    let notif = parse_line(&notif_lines[0]);
    assert_eq!(notif["method"], "notifications/tools/list_changed");
    assert!(notif.get("id").is_none());
}
