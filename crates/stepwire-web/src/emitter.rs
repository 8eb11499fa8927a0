//! [`EventEmitter`] that routes session events to WebSocket connections.
//!
//! Each connection registers an unbounded outbound queue under its
//! [`SessionId`]. Run events and request replies share that queue, so a
//! client sees them in the order they were produced.

use std::collections::HashMap;
use std::sync::Mutex;

use stepwire::SessionId;
use stepwire::events::{AgentEvent, EventEmitter};
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::WsMessage;

/// Routes events to the connection that owns each session.
#[derive(Default)]
pub struct WebEmitter {
    connections: Mutex<HashMap<SessionId, mpsc::UnboundedSender<WsMessage>>>,
}

impl WebEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its outbound queue.
    pub fn register(&self, session_id: &SessionId) -> mpsc::UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.clone(), tx);
        rx
    }

    pub fn unregister(&self, session_id: &SessionId) {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
    }

    /// Queue a frame for one connection. Frames for unknown or closed
    /// connections are dropped.
    pub fn send(&self, session_id: &SessionId, msg: impl Into<WsMessage>) {
        let msg = msg.into();
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = connections.get(session_id) else {
            debug!("No connection for {session_id}; dropping {}", msg.event_name());
            return;
        };
        if tx.send(msg).is_err() {
            connections.remove(session_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl EventEmitter for WebEmitter {
    fn emit(&self, session_id: &SessionId, event: &AgentEvent) {
        self.send(session_id, WsMessage::Event(event.clone()));
    }
}
