//! Axum server setup and router construction.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use stepwire::session::SessionRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;

use crate::api::{self, AppState};
use crate::emitter::WebEmitter;
use crate::ws::{self, WsState};

/// Build the full axum router.
///
/// The router serves:
/// - WebSocket at `/ws`
/// - Monitoring at `/health`, `/sessions`, `/version`
/// - Per-session REST at `/api/sessions/{id}` and `/api/sessions/{id}/stop`
/// - Optional static files for a bundled client
pub fn build_router(
    registry: Arc<SessionRegistry>,
    emitter: Arc<WebEmitter>,
    static_dir: Option<PathBuf>,
    cors: bool,
) -> Router {
    let app_state = AppState {
        registry: registry.clone(),
    };

    let ws_state = WsState { registry, emitter };

    // WebSocket routes (own state type).
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ws_state);

    // REST routes (own state type).
    let api_routes = Router::new()
        .route("/health", get(api::health))
        .route("/sessions", get(api::list_sessions))
        .route("/version", get(api::version))
        .route("/api/sessions/{id}", get(api::get_session))
        .route("/api/sessions/{id}/stop", post(api::stop_session))
        .with_state(app_state);

    let mut router = Router::new().merge(ws_routes).merge(api_routes);

    // Browser clients are typically served from a different origin.
    if cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind `bind_addr`, serve `router` on a background task, and return the
/// bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Web server stopped: {e}");
        }
    });

    Ok(addr)
}

/// Serve `router` on the current task until `shutdown` resolves.
pub async fn serve_until(
    router: Router,
    bind_addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
    on_bound: impl FnOnce(SocketAddr),
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    on_bound(listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
