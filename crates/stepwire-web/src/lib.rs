//! WebSocket and REST transport for stepwire agent sessions.
//!
//! `stepwire-web` provides an axum server that binds every WebSocket
//! connection to one [`AgentSession`](stepwire::session::AgentSession) and
//! streams that session's events back as JSON frames. A small REST surface
//! exposes health, version, and per-session status for monitoring.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stepwire::prelude::*;
//! use stepwire_web::{DemoLoopFactory, WebConfig, WebEmitter, spawn_web};
//!
//! let core = CoreLoader::new(DemoLoopFactory::new()).load()?;
//! let web = Arc::new(WebEmitter::new());
//! let registry = Arc::new(SessionRegistry::new(
//!     core,
//!     web.clone(),
//!     RegistryConfig::default(),
//! ));
//!
//! let addr = spawn_web(registry, web, WebConfig::default()).await?;
//! println!("ws://{addr}/ws");
//! ```
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──AgentEvent──▶ WebEmitter ──per-connection queue──▶ WebSocket client
//!                                                                        │
//!        SessionRegistry ◀── run_agent / user_input / stop_agent ────────┘
//! ```
//!
//! The [`WebEmitter`] implements [`EventEmitter`](stepwire::events::EventEmitter)
//! and routes each event to the connection that owns its session. Compose it
//! with [`LoggingEmitter`](stepwire::events::LoggingEmitter) in a
//! [`CompositeEmitter`](stepwire::events::CompositeEmitter) to log as well.

mod api;
pub mod demo;
pub mod emitter;
pub mod protocol;
pub mod server;
mod ws;

pub use demo::{DemoLoop, DemoLoopFactory};
pub use emitter::WebEmitter;
pub use protocol::{ClientMessage, Reply, WsMessage};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use stepwire::session::SessionRegistry;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5000;

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to bind to. Default: `0.0.0.0:5000`.
    pub bind_addr: SocketAddr,
    /// Directory of a static client bundle served at `/`.
    ///
    /// If `None`, only the API and WebSocket endpoints are served.
    pub static_dir: Option<PathBuf>,
    /// Allow cross-origin requests from any origin. Default: `true`.
    pub cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            static_dir: None,
            cors: true,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
///
/// # Arguments
///
/// * `registry` — Session table the connections operate on.
/// * `emitter` — The same [`WebEmitter`] the registry emits into.
/// * `config` — Server configuration.
pub async fn spawn_web(
    registry: Arc<SessionRegistry>,
    emitter: Arc<WebEmitter>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(registry, emitter, config.static_dir, config.cors);
    server::start_server(router, config.bind_addr).await
}
