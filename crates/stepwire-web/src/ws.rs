//! WebSocket upgrade handler and message dispatch.
//!
//! Each connection owns exactly one session:
//! 1. On connect a fresh [`SessionId`] is registered with the
//!    [`WebEmitter`] and the registry creates the session (which emits
//!    `connected`).
//! 2. A forward task drains the connection's outbound queue into the socket.
//! 3. Client requests are dispatched against the session; operational
//!    errors come back as `error` frames and never close the socket.
//! 4. On disconnect the session is removed from the registry, stopping any
//!    active run.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use stepwire::session::SessionRegistry;
use stepwire::{SessionError, SessionId};
use tracing::{debug, error, info};

use crate::emitter::WebEmitter;
use crate::protocol::{ClientMessage, Reply, StatusReply, WsMessage};

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<SessionRegistry>,
    pub emitter: Arc<WebEmitter>,
}

/// GET /ws — WebSocket upgrade handler.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(ws_state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, ws_state: WsState) {
    let (mut sink, mut stream) = socket.split();
    let session_id = SessionId::generate();
    info!("Client connecting: {session_id}");

    // Registered before creation so the `connected` event is queued.
    let mut outbound = ws_state.emitter.register(&session_id);
    if let Err(e) = ws_state.registry.create_session(&session_id) {
        error!("Failed to create session {session_id}: {e}");
        ws_state.emitter.unregister(&session_id);
        let _ = ws_send(
            &mut sink,
            &Reply::error(format!("Connection failed: {e}")).into(),
        )
        .await;
        return;
    }

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if ws_send(&mut sink, &msg).await.is_err() {
                break; // Client disconnected.
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => handle_client_message(&text, &session_id, &ws_state),
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    info!("Client disconnected: {session_id}");
    ws_state.registry.remove(&session_id).await;
    ws_state.emitter.unregister(&session_id);
    forward_task.abort();
}

/// Process a JSON request received from a client.
fn handle_client_message(text: &str, session_id: &SessionId, ws_state: &WsState) {
    let reply = |reply: Reply| ws_state.emitter.send(session_id, reply);

    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Malformed message from {session_id}: {e}");
            reply(Reply::error(format!("Invalid message: {e}")));
            return;
        }
    };

    let registry = &ws_state.registry;
    let Some(session) = registry.get(session_id) else {
        reply(Reply::error("Session not found"));
        return;
    };

    match msg {
        ClientMessage::RunAgent { .. } => {
            let Some(config) = msg.run_config() else {
                return;
            };
            // Success is reported by the run's own `agent_started` event.
            if let Err(e) = session.start_run(config) {
                reply(Reply::error(wire_error(&e)));
            }
        }
        ClientMessage::UserInput { input } => {
            if !session.is_running() {
                reply(Reply::error("Agent is not running"));
            } else if input.is_empty() {
                reply(Reply::error("Input is required"));
            } else {
                session.submit_input(input.clone());
                reply(Reply::UserInputSent { input });
            }
        }
        ClientMessage::StopAgent => {
            if session.request_stop() {
                reply(Reply::AgentStopRequested { success: true });
            } else {
                reply(Reply::error("Agent is not running"));
            }
        }
        ClientMessage::GetStatus => {
            let snapshot = session.status();
            let info = registry.core_info();
            reply(Reply::Status(StatusReply {
                session_id: snapshot.session_id,
                is_running: snapshot.is_running,
                status: snapshot.status,
                step_count: snapshot.step_count,
                config: snapshot.config,
                run_id: snapshot.run_id,
                last_error: snapshot.last_error,
                connected_at: snapshot.connected_at,
                agent_version: info.agent_version.clone(),
                api_provider: info.api_provider.clone(),
                output_dir: snapshot.output_dir,
            }));
        }
        ClientMessage::GetFiles => {
            let files = session.created_files();
            reply(Reply::FilesList {
                session_id: session_id.clone(),
                count: files.len(),
                files,
            });
        }
        ClientMessage::RefreshFiles => {
            let new_files = session.refresh_files();
            reply(Reply::FilesRefreshed {
                session_id: session_id.clone(),
                count: new_files.len(),
                new_files,
            });
        }
    }
}

/// Client-facing text for an operational error.
fn wire_error(err: &SessionError) -> String {
    match err {
        SessionError::InvalidConfig(reason) => reason.clone(),
        SessionError::SessionNotFound(_) => "Session not found".to_string(),
        other => other.to_string(),
    }
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = msg.to_frame().to_string();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
