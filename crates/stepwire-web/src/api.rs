//! REST endpoint handlers.
//!
//! These complement the WebSocket channel for monitoring and control from
//! outside a connection (health checks, dashboards, admin stop).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use stepwire::SessionId;
use stepwire::session::SessionRegistry;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

/// GET /health — Liveness plus a session count.
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let info = app.registry.core_info();
    Json(json!({
        "status": "healthy",
        "agent_version": info.agent_version,
        "api_provider": info.api_provider,
        "active_sessions": app.registry.len(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /sessions — Status snapshot of every session.
pub async fn list_sessions(State(app): State<AppState>) -> Json<serde_json::Value> {
    let sessions = app.registry.list_sessions();
    Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /version — Server and agent core versions.
pub async fn version(State(app): State<AppState>) -> Json<serde_json::Value> {
    let info = app.registry.core_info();
    Json(json!({
        "server_version": env!("CARGO_PKG_VERSION"),
        "agent_core_version": info.agent_version,
        "api_provider": info.api_provider,
        "default_model": info.default_model,
        "tools": info.tools,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /api/sessions/{id} — One session's status. 404 if unknown.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let id = SessionId::from(id);
    match app.registry.get_status(&id) {
        Ok(snapshot) => Ok(Json(json!(snapshot))),
        Err(e) => Err(not_found(e)),
    }
}

/// POST /api/sessions/{id}/stop — Request a stop. 404 if unknown.
///
/// `success` is `false` when the session had no active run.
pub async fn stop_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let id = SessionId::from(id);
    match app.registry.request_stop(&id) {
        Ok(success) => Ok(Json(json!({
            "success": success,
            "timestamp": Utc::now().to_rfc3339(),
        }))),
        Err(e) => Err(not_found(e)),
    }
}

fn not_found(err: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": err.to_string() })),
    )
}
