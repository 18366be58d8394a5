//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::service::Lobby;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The matchmaking lobby.
    pub lobby: Arc<Lobby>,
    /// Loaded configuration.
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Builds the state for `config` with a fresh lobby.
    #[must_use]
    pub fn new(config: GatewayConfig, lobby: Arc<Lobby>) -> Self {
        Self {
            lobby,
            config: Arc::new(config),
        }
    }
}
