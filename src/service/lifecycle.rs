//! Session teardown, disconnect cleanup and survivor requeue.
//!
//! Every path that ends a session (a client closing, an idle timeout, a
//! failed send, shutdown) converges on [`LifecycleCoordinator::teardown`],
//! which is idempotent: the registry entry is the token, and only the call
//! that removes it does any work.

use std::sync::Arc;

use chrono::Utc;

use super::chat_session::ChatSession;
use super::lobby::LobbyState;
use crate::domain::{ConnectionId, EndReason, ServerEvent, SessionState};
use crate::error::MatchError;

/// Stateless coordinator for connection and session lifecycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleCoordinator;

impl LifecycleCoordinator {
    /// Forgets `conn` entirely.
    ///
    /// Removes it from every waiting queue, ends its session (if any) and
    /// requeues the partner, then drops the connection record. Returns
    /// `false` when `conn` was already gone, making repeated calls no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] if the registry and the
    /// connection record disagree about `conn`'s partner.
    pub fn disconnect(&self, state: &mut LobbyState, conn: ConnectionId) -> Result<bool, MatchError> {
        let Some(record) = state.connections.remove(&conn) else {
            return Ok(false);
        };
        state.pool.remove_everywhere(conn);

        match record.session() {
            Some(session) => {
                session.end(EndReason::Disconnected(conn));
                self.teardown(state, session)?;
            }
            None => {
                if let Some(partner) = state.registry.partner_of(conn) {
                    return Err(MatchError::invariant(format!(
                        "connection {conn} is registered with {partner} but holds no session"
                    )));
                }
            }
        }

        let connected_secs = (Utc::now() - record.connected_at()).num_seconds();
        tracing::info!(connection_id = %conn, connected_secs, "connection removed from lobby");
        Ok(true)
    }

    /// Dismantles an ended session.
    ///
    /// Unregisters the pair, then for each participant still connected:
    /// the side whose channel is gone goes `Idle`; every other side gets a
    /// partner-left notice and returns to `Waiting` under its original
    /// topics. A side that cannot even receive the notice goes `Idle` and is
    /// left for its own driver to report. Returns the requeued connections.
    ///
    /// A still-active session is ended with [`EndReason::Shutdown`] first.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] if the registry holds the
    /// pair under a different session.
    pub fn teardown(
        &self,
        state: &mut LobbyState,
        session: &Arc<ChatSession>,
    ) -> Result<Vec<ConnectionId>, MatchError> {
        let reason = match session.state() {
            SessionState::Ended(reason) => reason,
            SessionState::Active => {
                session.end(EndReason::Shutdown);
                EndReason::Shutdown
            }
        };

        let [first, _] = session.participants();
        let Some(pairing) = state.registry.unpair(first.id)? else {
            return Ok(Vec::new());
        };
        if pairing.session_id != session.id() {
            return Err(MatchError::invariant(format!(
                "connection {} is registered in session {} while tearing down {}",
                first.id,
                pairing.session_id,
                session.id()
            )));
        }

        let mut requeued = Vec::new();
        for participant in session.participants() {
            let Some(conn) = state.connections.get_mut(&participant.id) else {
                continue;
            };
            if conn.session().is_none_or(|s| s.id() != session.id()) {
                continue;
            }
            if reason.is_gone(participant.id) {
                conn.mark_idle();
                continue;
            }
            match conn.outbox().send(ServerEvent::partner_left(reason)) {
                Ok(()) => {
                    conn.mark_waiting();
                    state.pool.enqueue(participant.id, conn.topics());
                    requeued.push(participant.id);
                }
                Err(_) => {
                    tracing::debug!(connection_id = %participant.id, "survivor unreachable; left idle");
                    conn.mark_idle();
                }
            }
        }

        tracing::info!(
            session_id = %session.id(),
            topic = %session.topic(),
            reason = reason.wire_reason(),
            requeued = requeued.len(),
            "chat session torn down"
        );
        Ok(requeued)
    }
}
