//! topic-match-gateway server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket and system endpoints.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use topic_match_gateway::api;
use topic_match_gateway::app_state::AppState;
use topic_match_gateway::config::GatewayConfig;
use topic_match_gateway::domain::ThemedNicknames;
use topic_match_gateway::service::{Lobby, LobbySettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        idle_timeout_secs = config.idle_timeout_secs,
        default_topic = %config.default_topic,
        "starting topic-match-gateway"
    );

    // Build service layer
    let lobby = Arc::new(Lobby::new(
        LobbySettings::from(&config),
        Arc::new(ThemedNicknames),
    ));

    // Build router
    let listen_addr = config.listen_addr;
    let app = api::build_router(AppState::new(config, Arc::clone(&lobby)));

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(lobby))
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after releasing every client, so upgraded sockets
/// close and the server can drain.
async fn shutdown_signal(lobby: Arc<Lobby>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    lobby.shutdown().await;
}
