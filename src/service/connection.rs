//! Per-connection record kept in the lobby's connection table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::ChatSession;
use crate::domain::{ConnectionId, ConnectionState, Outbox, TopicSet};

/// The session a connection is currently assigned to, as published to its
/// driver task. `None` while idle or waiting.
pub type Assignment = Option<Arc<ChatSession>>;

/// Lobby-side state of one client connection.
///
/// The state setters keep `state`, `session` and the published
/// [`Assignment`] in step: `Matched` holds exactly when a session is set.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    nickname: Option<String>,
    topics: TopicSet,
    state: ConnectionState,
    session: Option<Arc<ChatSession>>,
    outbox: Outbox,
    assignment: watch::Sender<Assignment>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Creates an idle record and the receiver its driver waits on.
    #[must_use]
    pub fn new(id: ConnectionId, outbox: Outbox) -> (Self, watch::Receiver<Assignment>) {
        let (assignment, receiver) = watch::channel(None);
        let record = Self {
            id,
            nickname: None,
            topics: TopicSet::default(),
            state: ConnectionState::Idle,
            session: None,
            outbox,
            assignment,
            connected_at: Utc::now(),
        };
        (record, receiver)
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Assigned nickname, once the connection has joined.
    #[must_use]
    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Sets the nickname on first call; later calls keep the original.
    pub fn assign_nickname(&mut self, generate: impl FnOnce() -> String) -> &str {
        self.nickname.get_or_insert_with(generate)
    }

    /// Topics selected on join.
    #[must_use]
    pub const fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Replaces the topic selection.
    pub fn set_topics(&mut self, topics: TopicSet) {
        self.topics = topics;
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// The session this connection is matched in, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<ChatSession>> {
        self.session.as_ref()
    }

    /// Send half of the connection.
    #[must_use]
    pub const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Time the transport handed the connection to the lobby.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Moves to `Waiting`, clearing any session.
    pub fn mark_waiting(&mut self) {
        self.transition(ConnectionState::Waiting, None);
    }

    /// Moves to `Matched` in `session` and wakes the driver.
    pub fn mark_matched(&mut self, session: Arc<ChatSession>) {
        self.transition(ConnectionState::Matched, Some(session));
    }

    /// Moves to `Idle`, clearing any session.
    pub fn mark_idle(&mut self) {
        self.transition(ConnectionState::Idle, None);
    }

    fn transition(&mut self, state: ConnectionState, session: Assignment) {
        self.state = state;
        self.session.clone_from(&session);
        self.assignment.send_replace(session);
    }
}
