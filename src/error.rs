//! Matchmaking error types.
//!
//! [`MatchError`] is the central error type of the lobby. Transport-level
//! variants degrade to the disconnect path of the single connection they
//! belong to; [`MatchError::InvariantViolation`] signals a programming error
//! and is never swallowed.

use crate::domain::ConnectionId;

/// Lobby error enum with stable numeric codes for wire `error` events.
///
/// # Error Code Ranges
///
/// | Range     | Category     |
/// |-----------|--------------|
/// | 1000–1999 | Transport    |
/// | 2000–2999 | Client state |
/// | 3000–3999 | Server       |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The peer closed its channel or the network failed.
    #[error("connection closed")]
    ConnectionClosed,

    /// No message arrived within the receive deadline.
    #[error("receive timed out")]
    Timeout,

    /// The client tried to join while already waiting or matched.
    #[error("connection already joined")]
    DuplicateJoin,

    /// The connection is not (or no longer) known to the lobby.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Registry asymmetry, double state or similar broken bookkeeping.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl MatchError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::ConnectionClosed => 1001,
            Self::Timeout => 1002,
            Self::DuplicateJoin => 2001,
            Self::UnknownConnection(_) => 2002,
            Self::InvariantViolation(_) => 3000,
        }
    }

    /// Returns `true` for failures that only mean "this channel is gone".
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Timeout)
    }

    /// Builds a [`MatchError::InvariantViolation`] and logs it at error
    /// level at the point of detection.
    #[must_use]
    pub fn invariant(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(%detail, "lobby invariant violated");
        Self::InvariantViolation(detail)
    }
}
