//! Integration tests for the stepwire-web server.
//!
//! These tests start a real axum server on a random port and exercise
//! the REST and WebSocket endpoints against the demo loop.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use stepwire::prelude::*;
use stepwire_web::{DemoLoopFactory, WebConfig, WebEmitter, spawn_web};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    base: String,
    ws_url: String,
    _output: tempfile::TempDir,
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server() -> TestServer {
    let output = tempfile::tempdir().unwrap();
    let core = CoreLoader::new(DemoLoopFactory::new())
        .with_api_provider("demo")
        .with_tools(["write_file"])
        .load()
        .unwrap();
    let web = Arc::new(WebEmitter::new());
    let registry = Arc::new(SessionRegistry::new(
        core,
        web.clone(),
        RegistryConfig::default().with_output_root(output.path()),
    ));

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        ..Default::default()
    };
    let addr = spawn_web(registry, web, config).await.unwrap();
    TestServer {
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        _output: output,
    }
}

async fn connect(server: &TestServer) -> (Ws, Value) {
    let (mut ws, _) = connect_async(server.ws_url.as_str()).await.unwrap();
    let connected = next_frame(&mut ws).await;
    assert_eq!(connected["event"], "connected");
    (ws, connected)
}

async fn send(ws: &mut Ws, msg: Value) {
    ws.send(Message::Text(msg.to_string())).await.unwrap();
}

async fn next_frame(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read frames until one named `event` arrives; returns every frame read.
async fn frames_until(ws: &mut Ws, event: &str) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(ws).await;
        let done = frame["event"] == event;
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

/// Read frames until every name in `events` has been seen, in any order.
async fn frames_until_all(ws: &mut Ws, events: &[&str]) -> Vec<Value> {
    let mut frames = Vec::new();
    while !events.iter().all(|e| frames.iter().any(|f: &Value| f["event"] == *e)) {
        frames.push(next_frame(ws).await);
    }
    frames
}

fn names(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["event"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_core_and_session_count() {
    let server = spawn_test_server().await;

    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["api_provider"], "demo");
    assert_eq!(json["active_sessions"], 0);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn version_lists_tools() {
    let server = spawn_test_server().await;

    let json: Value = reqwest::get(format!("{}/version", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["server_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["tools"], json!(["write_file"]));
}

#[tokio::test]
async fn unknown_session_routes_return_404() {
    let server = spawn_test_server().await;

    let resp = reqwest::get(format!("{}/api/sessions/nope", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let json: Value = resp.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("nope"));

    let resp = reqwest::Client::new()
        .post(format!("{}/api/sessions/nope/stop", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn connection_creates_a_listed_session() {
    let server = spawn_test_server().await;
    let (_ws, connected) = connect(&server).await;

    let session_id = connected["data"]["session_id"].as_str().unwrap().to_string();
    assert!(connected["data"]["output_dir"].is_string());
    assert!(connected["data"]["timestamp"].is_string());

    let json: Value = reqwest::get(format!("{}/sessions", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["count"], 1);
    assert_eq!(json["sessions"][0]["session_id"], session_id.as_str());

    let json: Value = reqwest::get(format!("{}/api/sessions/{session_id}", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "idle");
    assert_eq!(json["is_running"], false);
}

#[tokio::test]
async fn run_agent_streams_to_agent_finished() {
    let server = spawn_test_server().await;
    let (mut ws, _) = connect(&server).await;

    send(
        &mut ws,
        json!({"type": "run_agent", "instruction": "Write notes", "max_steps": 3}),
    )
    .await;
    let frames = frames_until(&mut ws, "agent_finished").await;
    let names = names(&frames);

    assert_eq!(names.first().map(String::as_str), Some("agent_started"));
    assert_eq!(names.iter().filter(|n| *n == "step_start").count(), 3);
    for expected in [
        "assistant_message",
        "tool_call",
        "file_created",
        "step_summary",
        "task_completed",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
    let completed = frames.iter().find(|f| f["event"] == "task_completed").unwrap();
    assert_eq!(completed["data"]["reason"], "step_limit");

    send(&mut ws, json!({"type": "get_files"})).await;
    let files = frames_until(&mut ws, "files_list").await;
    let files = files.last().unwrap();
    assert_eq!(files["data"]["count"], 1);
    assert_eq!(files["data"]["files"][0]["name"], "step_001_notes.md");

    send(&mut ws, json!({"type": "get_status"})).await;
    let status = frames_until(&mut ws, "status").await;
    let status = &status.last().unwrap()["data"];
    assert_eq!(status["step_count"], 3);
    assert_eq!(status["config"]["instruction"], "Write notes");
    assert_eq!(status["config"]["max_steps"], 3);
}

#[tokio::test]
async fn operational_errors_are_error_frames() {
    let server = spawn_test_server().await;
    let (mut ws, _) = connect(&server).await;

    send(&mut ws, json!({"type": "run_agent", "instruction": ""})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(frame["data"]["message"], "Instruction is required");

    send(&mut ws, json!({"type": "user_input", "input": "y"})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["data"]["message"], "Agent is not running");

    send(&mut ws, json!({"type": "stop_agent"})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["data"]["message"], "Agent is not running");

    send(&mut ws, json!({"type": "bogus"})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "error");

    // The socket stays usable.
    send(&mut ws, json!({"type": "get_status"})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "status");
    assert_eq!(frame["data"]["is_running"], false);
    assert_eq!(frame["data"]["api_provider"], "demo");
    assert!(frame["data"]["config"].is_null());
}

#[tokio::test]
async fn waiting_run_accepts_input_and_rejects_second_start() {
    let server = spawn_test_server().await;
    let (mut ws, _) = connect(&server).await;

    send(
        &mut ws,
        json!({"type": "run_agent", "instruction": "x", "max_steps": 10, "auto_continue": 1}),
    )
    .await;
    let frames = frames_until(&mut ws, "waiting_for_input").await;
    assert_eq!(frames.last().unwrap()["data"]["prompt"], "Continue? (y/n)");

    send(&mut ws, json!({"type": "run_agent", "instruction": "again"})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(frame["data"]["message"], "Agent is already running");

    send(&mut ws, json!({"type": "user_input", "input": ""})).await;
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["data"]["message"], "Input is required");

    send(&mut ws, json!({"type": "user_input", "input": "n"})).await;
    let frames = frames_until_all(&mut ws, &["user_input_sent", "agent_finished"]).await;
    let completed = frames.iter().find(|f| f["event"] == "task_completed").unwrap();
    assert_eq!(completed["data"]["reason"], "task_done");
}

#[tokio::test]
async fn stop_agent_while_waiting_stops_the_run() {
    let server = spawn_test_server().await;
    let (mut ws, _) = connect(&server).await;

    send(
        &mut ws,
        json!({"type": "run_agent", "instruction": "x", "auto_continue": 1}),
    )
    .await;
    frames_until(&mut ws, "waiting_for_input").await;

    send(&mut ws, json!({"type": "stop_agent"})).await;
    let frames = frames_until_all(&mut ws, &["agent_stop_requested", "stopped"]).await;
    let requested = frames
        .iter()
        .find(|f| f["event"] == "agent_stop_requested")
        .unwrap();
    assert_eq!(requested["data"]["success"], true);
    assert!(!names(&frames).iter().any(|n| n == "step_start"));
}

#[tokio::test]
async fn disconnect_removes_the_session() {
    let server = spawn_test_server().await;
    let (mut ws, _) = connect(&server).await;
    send(
        &mut ws,
        json!({"type": "run_agent", "instruction": "x", "auto_continue": 1}),
    )
    .await;
    frames_until(&mut ws, "waiting_for_input").await;
    ws.close(None).await.unwrap();

    let mut remaining = u64::MAX;
    for _ in 0..50 {
        let json: Value = reqwest::get(format!("{}/health", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        remaining = json["active_sessions"].as_u64().unwrap();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(remaining, 0);
}
