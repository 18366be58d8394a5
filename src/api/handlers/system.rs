//! System endpoints: banner, health check, lobby statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::service::LobbyStats;

/// Plain-text banner served at `/`.
pub const BANNER: &str = "WebSocket server is running!";

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /` — Liveness banner.
#[utoipa::path(
    get,
    path = "/",
    tag = "System",
    summary = "Banner",
    description = "Plain-text liveness banner for load balancers and humans.",
    responses(
        (status = 200, description = "Server is running", body = String, content_type = "text/plain"),
    )
)]
pub async fn index_handler() -> impl IntoResponse {
    (StatusCode::OK, BANNER)
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /stats` — Lobby counters.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "System",
    summary = "Lobby statistics",
    description = "Connected clients, waiting clients per topic and live chat sessions.",
    responses(
        (status = 200, description = "Current lobby counters", body = LobbyStats),
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.lobby.stats().await))
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
}
