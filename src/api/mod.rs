//! HTTP surface: system routes, the WebSocket endpoint and router
//! composition.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete application router: system routes plus `/ws`,
/// wrapped in request tracing and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::system::routes())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
