//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::Topic;

/// Smallest accepted idle timeout. A zero timeout would end every session
/// the moment it starts and rematch the same pair in a tight loop.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:5000`).
    pub listen_addr: SocketAddr,

    /// Seconds of silence after which an active chat session ends.
    pub idle_timeout_secs: u64,

    /// Seconds a fresh connection may wait before sending its topic
    /// selection.
    pub join_timeout_secs: u64,

    /// Topic used when a client selects none.
    pub default_topic: Topic,

    /// Upper bound on topics accepted from a single join.
    pub max_topics_per_join: usize,

    /// Milliseconds the writer gets to flush pending events after the
    /// client driver returns.
    pub writer_flush_ms: u64,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse()?;

        let defaults = Self::default();
        let default_topic = std::env::var("DEFAULT_TOPIC")
            .ok()
            .and_then(|raw| Topic::parse(&raw))
            .unwrap_or(defaults.default_topic);

        Ok(Self {
            listen_addr,
            idle_timeout_secs: parse_env("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)
                .max(MIN_IDLE_TIMEOUT.as_secs()),
            join_timeout_secs: parse_env("JOIN_TIMEOUT_SECS", defaults.join_timeout_secs),
            default_topic,
            max_topics_per_join: parse_env("MAX_TOPICS_PER_JOIN", defaults.max_topics_per_join),
            writer_flush_ms: parse_env("WRITER_FLUSH_MS", defaults.writer_flush_ms),
        })
    }

    /// Idle timeout as a [`Duration`], never below [`MIN_IDLE_TIMEOUT`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs).max(MIN_IDLE_TIMEOUT)
    }

    /// Join timeout as a [`Duration`].
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// Writer flush grace as a [`Duration`].
    #[must_use]
    pub const fn writer_flush(&self) -> Duration {
        Duration::from_millis(self.writer_flush_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            idle_timeout_secs: 300,
            join_timeout_secs: 120,
            default_topic: Topic::default(),
            max_topics_per_join: 8,
            writer_flush_ms: 500,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
