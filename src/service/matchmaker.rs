//! Topic-scoped pairing pass.

use std::sync::Arc;
use std::time::Duration;

use super::chat_session::{ChatSession, Participant};
use super::lobby::LobbyState;
use crate::domain::{ConnectionId, ConnectionState, Topic};
use crate::error::MatchError;

/// Forms chat sessions out of the waiting pool.
///
/// Runs inside the lobby's critical section, so the "still waiting?" check
/// and the pop it guards are atomic with respect to disconnects and other
/// passes.
#[derive(Debug, Clone, Copy)]
pub struct Matchmaker {
    idle_timeout: Duration,
}

impl Matchmaker {
    /// Creates a matchmaker whose sessions expire after `idle_timeout`.
    #[must_use]
    pub const fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Pairs every topic down to fewer than two waiting connections.
    ///
    /// Topics are scanned in name order, each in strict FIFO order. Entries
    /// whose connection is no longer `Waiting`, or whose outbox is already
    /// closed, are discarded. Both sides of
    /// every new session are told their partner's nickname before the
    /// session is published to their drivers.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] if the registry refuses a
    /// pair or a waiting connection has no nickname.
    pub fn run_pass(&self, state: &mut LobbyState) -> Result<Vec<Arc<ChatSession>>, MatchError> {
        let mut formed = Vec::new();
        for topic in state.pool.pairable_topics() {
            while let Some((a, b)) = state.pool.try_dequeue_pair(&topic) {
                match (is_waiting(state, a), is_waiting(state, b)) {
                    (true, true) => formed.push(self.pair(state, &topic, a, b)?),
                    (true, false) => {
                        tracing::warn!(connection_id = %b, %topic, "stale pool entry dropped");
                        state.pool.push_front(&topic, a);
                    }
                    (false, true) => {
                        tracing::warn!(connection_id = %a, %topic, "stale pool entry dropped");
                        state.pool.push_front(&topic, b);
                    }
                    (false, false) => {
                        tracing::warn!(%topic, "two stale pool entries dropped");
                    }
                }
            }
        }
        Ok(formed)
    }

    fn pair(
        &self,
        state: &mut LobbyState,
        topic: &Topic,
        a: ConnectionId,
        b: ConnectionId,
    ) -> Result<Arc<ChatSession>, MatchError> {
        let session = Arc::new(ChatSession::new(
            topic.clone(),
            participant(state, a)?,
            participant(state, b)?,
            self.idle_timeout,
        ));
        state.registry.pair(a, b, session.id())?;
        session.announce();

        for id in [a, b] {
            state.pool.remove_everywhere(id);
            if let Some(conn) = state.connections.get_mut(&id) {
                conn.mark_matched(Arc::clone(&session));
            }
        }

        tracing::info!(
            session_id = %session.id(),
            first = %a,
            second = %b,
            %topic,
            "connections matched"
        );
        Ok(session)
    }
}

fn is_waiting(state: &LobbyState, conn: ConnectionId) -> bool {
    state
        .connections
        .get(&conn)
        .is_some_and(|c| c.state() == ConnectionState::Waiting && !c.outbox().is_closed())
}

fn participant(state: &LobbyState, conn: ConnectionId) -> Result<Participant, MatchError> {
    let record = state
        .connections
        .get(&conn)
        .ok_or_else(|| MatchError::invariant(format!("pooled connection {conn} has no record")))?;
    let nickname = record
        .nickname()
        .ok_or_else(|| MatchError::invariant(format!("waiting connection {conn} has no nickname")))?;
    Ok(Participant {
        id: conn,
        nickname: nickname.to_string(),
        outbox: record.outbox().clone(),
    })
}
