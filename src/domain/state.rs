//! Connection and session lifecycle states.

use serde::Serialize;

use super::ConnectionId;

/// Where a connection currently sits in the lobby. Exactly one holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connected but not (or no longer) queued: before the first join, or
    /// after its channel failed mid-teardown.
    Idle,
    /// Queued in the waiting pool under its topics.
    Waiting,
    /// Paired and relaying inside a chat session.
    Matched,
}

/// Why a chat session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The channel of this connection closed, errored or refused a send.
    Disconnected(ConnectionId),
    /// No message was relayed for the configured idle period.
    IdleTimeout,
    /// The lobby is shutting down.
    Shutdown,
}

impl EndReason {
    /// Returns `true` if `conn` is the side whose channel is gone.
    #[must_use]
    pub fn is_gone(&self, conn: ConnectionId) -> bool {
        matches!(self, Self::Disconnected(gone) if *gone == conn)
    }

    /// Reason string sent to surviving clients. Never reveals identifiers.
    #[must_use]
    pub const fn wire_reason(&self) -> &'static str {
        match self {
            Self::Disconnected(_) => "partner_disconnected",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// State of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Relaying messages.
    Active,
    /// Terminal; carries the reason of the single Active → Ended transition.
    Ended(EndReason),
}

impl SessionState {
    /// Returns `true` once the session has ended.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self, Self::Ended(_))
    }
}
