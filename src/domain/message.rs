//! Wire messages exchanged with clients.
//!
//! Inbound frames may be tagged JSON or plain text; outbound events are
//! always tagged JSON so clients can tell the kinds apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EndReason, SessionId, Topic, TopicSet};

/// Notice text sent with [`ServerEvent::PartnerLeft`].
pub const PARTNER_LEFT_NOTICE: &str = "Your chat partner left. Searching for a new match...";

/// Notice text sent with [`ServerEvent::PartnerLeft`] when the server stops.
pub const SHUTDOWN_NOTICE: &str = "The server is shutting down. Your chat has ended.";

/// Server → client event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The nickname assigned to this client on its first join.
    Nickname {
        /// Assigned nickname.
        nickname: String,
        /// Topics the client is now waiting under.
        topics: TopicSet,
    },
    /// A partner was found; relay starts after this event.
    Matched {
        /// Nickname of the partner.
        partner_nickname: String,
        /// Topic the pair was formed on.
        topic: Topic,
        /// Session identifier.
        session_id: SessionId,
        /// Pairing time.
        timestamp: DateTime<Utc>,
    },
    /// A chat line relayed from the partner.
    Message {
        /// Sender nickname.
        from: String,
        /// Verbatim text.
        text: String,
        /// Rendered `"<nickname>: <text>"` line.
        line: String,
    },
    /// The session ended; the client is back in the waiting pool.
    PartnerLeft {
        /// Human-readable notice.
        message: String,
        /// Machine-readable reason (`partner_disconnected`, `idle_timeout`,
        /// `shutdown`).
        reason: String,
    },
    /// A server-side failure affecting this client.
    Error {
        /// Numeric error code (see [`crate::error::MatchError::error_code`]).
        code: u32,
        /// Human-readable message.
        message: String,
    },
}

impl ServerEvent {
    /// Builds a relayed chat line from `from`.
    #[must_use]
    pub fn chat(from: &str, text: &str) -> Self {
        Self::Message {
            from: from.to_string(),
            text: text.to_string(),
            line: format!("{from}: {text}"),
        }
    }

    /// Builds the notice for a session that ended with `reason`.
    ///
    /// Only a shutdown leaves the client unqueued, so it gets its own text.
    #[must_use]
    pub fn partner_left(reason: EndReason) -> Self {
        let message = match reason {
            EndReason::Shutdown => SHUTDOWN_NOTICE,
            EndReason::Disconnected(_) | EndReason::IdleTimeout => PARTNER_LEFT_NOTICE,
        };
        Self::PartnerLeft {
            message: message.to_string(),
            reason: reason.wire_reason().to_string(),
        }
    }
}

/// Client → server frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Topic selection.
    Join {
        /// Requested topic names; empty means the default topic.
        #[serde(default)]
        topics: Vec<String>,
    },
    /// Chat text for the partner.
    Message {
        /// Text to relay.
        #[serde(alias = "message")]
        text: String,
    },
}

impl ClientFrame {
    /// Interprets the first inbound message as a topic selection.
    ///
    /// A JSON `join` frame yields its topics; anything else is read as
    /// topic names separated by commas or whitespace.
    #[must_use]
    pub fn selection(raw: &str) -> Vec<String> {
        match serde_json::from_str::<Self>(raw) {
            Ok(Self::Join { topics }) => topics,
            Ok(Self::Message { text }) => split_names(&text),
            Err(_) => split_names(raw),
        }
    }

    /// Interprets a later inbound message. Plain text is chat.
    #[must_use]
    pub fn chat(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::Message {
            text: raw.to_string(),
        })
    }
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn chat_line_is_prefixed_with_nickname() {
        let ServerEvent::Message { line, .. } = ServerEvent::chat("PixelNinja7", "hi") else {
            panic!("expected message");
        };
        assert_eq!(line, "PixelNinja7: hi");
    }

    #[test]
    fn events_are_tagged() {
        let Ok(json) = serde_json::to_value(ServerEvent::partner_left(EndReason::IdleTimeout)) else {
            panic!("serialization failed");
        };
        assert_eq!(json["event"], "partner_left");
        assert_eq!(json["reason"], "idle_timeout");
        assert_eq!(json["message"], PARTNER_LEFT_NOTICE);
    }

    #[test]
    fn shutdown_notice_does_not_promise_a_rematch() {
        let ServerEvent::PartnerLeft { message, reason } = ServerEvent::partner_left(EndReason::Shutdown)
        else {
            panic!("expected a partner-left notice");
        };
        assert_eq!(message, SHUTDOWN_NOTICE);
        assert_eq!(reason, "shutdown");
    }

    #[test]
    fn selection_accepts_json_and_plain_text() {
        assert_eq!(
            ClientFrame::selection(r#"{"type":"join","topics":["gaming","music"]}"#),
            vec!["gaming", "music"]
        );
        assert_eq!(ClientFrame::selection("gaming, tech"), vec!["gaming", "tech"]);
        assert!(ClientFrame::selection("   ").is_empty());
    }

    #[test]
    fn chat_falls_back_to_plain_text() {
        assert_eq!(
            ClientFrame::chat("hello there"),
            ClientFrame::Message {
                text: "hello there".to_string()
            }
        );
        assert_eq!(
            ClientFrame::chat(r#"{"type":"message","message":"hey"}"#),
            ClientFrame::Message {
                text: "hey".to_string()
            }
        );
        assert_eq!(
            ClientFrame::chat(r#"{"type":"join"}"#),
            ClientFrame::Join { topics: vec![] }
        );
    }
}
