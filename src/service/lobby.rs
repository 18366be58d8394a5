//! Process-scoped matchmaking service.
//!
//! [`Lobby`] owns the connection table, the waiting pool and the session
//! registry behind a single mutex and exposes the matchmaking operations as
//! short critical sections. No critical section awaits I/O: outbound events
//! are pushed into unbounded outboxes and drained by each transport's writer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use utoipa::ToSchema;

use super::chat_session::ChatSession;
use super::connection::{Assignment, Connection};
use super::lifecycle::LifecycleCoordinator;
use super::matchmaker::Matchmaker;
use crate::config::{GatewayConfig, MIN_IDLE_TIMEOUT};
use crate::domain::{
    ConnectionId, ConnectionState, EndReason, NicknameProvider, Outbox, ServerEvent,
    SessionRegistry, Topic, TopicSet, WaitingPool,
};
use crate::error::MatchError;

/// Everything guarded by the lobby lock.
#[derive(Debug, Default)]
pub struct LobbyState {
    /// Every live connection, by identifier.
    pub connections: HashMap<ConnectionId, Connection>,
    /// Topic queues of waiting connections.
    pub pool: WaitingPool,
    /// Who is matched with whom.
    pub registry: SessionRegistry,
}

impl LobbyState {
    /// Checks the cross-structure invariants.
    ///
    /// - the registry is symmetric and irreflexive;
    /// - every record is filed under its own identifier;
    /// - a pooled connection is `Waiting`;
    /// - a connection is `Matched` exactly when it holds a session and has a
    ///   registry entry for that session.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] naming the first breach.
    pub fn verify(&self) -> Result<(), MatchError> {
        if !self.registry.is_consistent() {
            return Err(MatchError::invariant("session registry is not symmetric"));
        }
        for (id, conn) in &self.connections {
            if conn.id() != *id {
                return Err(MatchError::invariant(format!(
                    "connection {} filed under {id}",
                    conn.id()
                )));
            }
            let pooled = self.pool.contains(*id);
            let pairing = self.registry.pairing_of(*id);
            let consistent = match conn.state() {
                ConnectionState::Waiting => pairing.is_none() && conn.session().is_none(),
                ConnectionState::Matched => {
                    !pooled
                        && conn
                            .session()
                            .zip(pairing)
                            .is_some_and(|(s, p)| s.id() == p.session_id)
                }
                ConnectionState::Idle => !pooled && pairing.is_none(),
            };
            if !consistent {
                return Err(MatchError::invariant(format!(
                    "connection {id} in state {:?} (pooled: {pooled}, paired: {})",
                    conn.state(),
                    pairing.is_some()
                )));
            }
        }
        Ok(())
    }
}

/// Lobby tunables, derived from [`GatewayConfig`].
#[derive(Debug, Clone)]
pub struct LobbySettings {
    /// Silence after which an active session ends.
    pub idle_timeout: Duration,
    /// Topic used for empty selections.
    pub default_topic: Topic,
    /// Cap on topics per join.
    pub max_topics_per_join: usize,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for LobbySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            default_topic: config.default_topic.clone(),
            max_topics_per_join: config.max_topics_per_join,
        }
    }
}

/// Handle returned by [`Lobby::register`].
#[derive(Debug)]
pub struct Registration {
    /// Identifier assigned to the connection.
    pub id: ConnectionId,
    /// Publishes the session the connection gets matched into. Closes when
    /// the lobby forgets the connection.
    pub assignment: watch::Receiver<Assignment>,
}

/// Result of [`Lobby::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection now waits under `topics`.
    Queued {
        /// Nickname assigned on this or an earlier join.
        nickname: String,
        /// Normalised topic selection.
        topics: TopicSet,
    },
    /// The connection was already waiting or matched; nothing changed.
    Duplicate(ConnectionState),
}

/// Point-in-time counters served at `/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LobbyStats {
    /// Connections known to the lobby.
    pub connections: usize,
    /// Waiting connections per topic.
    pub waiting: BTreeMap<String, usize>,
    /// Live chat sessions.
    pub active_sessions: usize,
}

/// The matchmaking service.
#[derive(Debug)]
pub struct Lobby {
    state: Mutex<LobbyState>,
    settings: LobbySettings,
    nicknames: Arc<dyn NicknameProvider>,
    matchmaker: Matchmaker,
    lifecycle: LifecycleCoordinator,
}

impl Lobby {
    /// Creates an empty lobby.
    ///
    /// An idle timeout below [`MIN_IDLE_TIMEOUT`] is raised to it.
    #[must_use]
    pub fn new(mut settings: LobbySettings, nicknames: Arc<dyn NicknameProvider>) -> Self {
        if settings.idle_timeout < MIN_IDLE_TIMEOUT {
            tracing::warn!(
                requested_ms = u64::try_from(settings.idle_timeout.as_millis()).unwrap_or(u64::MAX),
                "idle timeout raised to minimum"
            );
            settings.idle_timeout = MIN_IDLE_TIMEOUT;
        }
        Self {
            state: Mutex::new(LobbyState::default()),
            matchmaker: Matchmaker::new(settings.idle_timeout),
            lifecycle: LifecycleCoordinator,
            settings,
            nicknames,
        }
    }

    /// Adds a fresh `Idle` connection that sends through `outbox`.
    pub async fn register(&self, outbox: Outbox) -> Registration {
        let id = ConnectionId::new();
        let (record, assignment) = Connection::new(id, outbox);
        self.state.lock().await.connections.insert(id, record);
        tracing::debug!(connection_id = %id, "connection registered");
        Registration { id, assignment }
    }

    /// Queues an idle connection under the topics in `names`.
    ///
    /// Assigns the nickname on the first join, sends it to the client, then
    /// runs a matching pass. A connection that is already waiting or matched
    /// is left untouched and [`JoinOutcome::Duplicate`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::UnknownConnection`] if `id` is not registered
    /// and [`MatchError::InvariantViolation`] if the pass breaks bookkeeping.
    pub async fn join<S: AsRef<str>>(
        &self,
        id: ConnectionId,
        names: &[S],
    ) -> Result<JoinOutcome, MatchError> {
        let topics = TopicSet::from_names(
            names.iter().map(AsRef::as_ref),
            &self.settings.default_topic,
            self.settings.max_topics_per_join,
        );

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let conn = state
            .connections
            .get_mut(&id)
            .ok_or(MatchError::UnknownConnection(id))?;
        if conn.state() != ConnectionState::Idle {
            tracing::debug!(connection_id = %id, state = ?conn.state(), "duplicate join ignored");
            return Ok(JoinOutcome::Duplicate(conn.state()));
        }

        let nickname = conn
            .assign_nickname(|| self.nicknames.generate(topics.primary()))
            .to_string();
        conn.set_topics(topics.clone());
        conn.mark_waiting();
        if conn
            .outbox()
            .send(ServerEvent::Nickname {
                nickname: nickname.clone(),
                topics: topics.clone(),
            })
            .is_err()
        {
            tracing::debug!(connection_id = %id, "nickname notice not delivered");
        }
        state.pool.enqueue(id, &topics);
        tracing::info!(connection_id = %id, %nickname, topics = topics.len(), "joined waiting pool");

        tripwire(self.matchmaker.run_pass(state).and_then(|_| debug_verify(state)))?;
        Ok(JoinOutcome::Queued { nickname, topics })
    }

    /// Removes `id` from the lobby, ending its session and requeuing its
    /// partner. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] on broken bookkeeping.
    pub async fn on_disconnect(&self, id: ConnectionId) -> Result<bool, MatchError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let removed = tripwire(self.lifecycle.disconnect(state, id))?;
        if removed {
            tripwire(self.matchmaker.run_pass(state).and_then(|_| debug_verify(state)))?;
        }
        Ok(removed)
    }

    /// Tears down a session that ended by timeout or failed send, requeuing
    /// the reachable sides. No-op if it was already torn down.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] on broken bookkeeping.
    pub async fn on_session_ended(&self, session: &Arc<ChatSession>) -> Result<(), MatchError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let requeued = tripwire(self.lifecycle.teardown(state, session))?;
        if !requeued.is_empty() {
            tripwire(self.matchmaker.run_pass(state))?;
        }
        tripwire(debug_verify(state))
    }

    /// Ends every session, empties the pool and forgets every connection.
    ///
    /// Matched clients get a `shutdown` partner-left notice; every driver
    /// task observes its closed assignment channel and returns.
    pub async fn shutdown(&self) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut ended = 0_usize;
        for conn in state.connections.values() {
            if let Some(session) = conn.session() {
                if session.end(EndReason::Shutdown) {
                    ended += 1;
                }
                let _ = conn
                    .outbox()
                    .send(ServerEvent::partner_left(EndReason::Shutdown));
            }
        }
        let dropped = state.connections.len();
        state.connections.clear();
        state.pool = WaitingPool::new();
        state.registry.clear();
        tracing::info!(sessions = ended, connections = dropped, "lobby shut down");
    }

    /// Current counters.
    pub async fn stats(&self) -> LobbyStats {
        let state = self.state.lock().await;
        LobbyStats {
            connections: state.connections.len(),
            waiting: state.pool.sizes(),
            active_sessions: state.registry.session_count(),
        }
    }

    /// Lifecycle state of `id`, if known.
    pub async fn connection_state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.state.lock().await.connections.get(&id).map(Connection::state)
    }

    /// Current partner of `id`, if matched.
    pub async fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.state.lock().await.registry.partner_of(id)
    }

    /// Returns `true` if `id` waits under `topic`.
    pub async fn is_waiting_in(&self, id: ConnectionId, topic: &Topic) -> bool {
        let state = self.state.lock().await;
        state
            .connections
            .get(&id)
            .is_some_and(|c| c.state() == ConnectionState::Waiting && c.topics().contains(topic))
            && state.pool.contains(id)
    }

    /// Runs [`LobbyState::verify`] under the lock.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] naming the first breach.
    pub async fn verify(&self) -> Result<(), MatchError> {
        self.state.lock().await.verify()
    }
}

fn debug_verify(state: &LobbyState) -> Result<(), MatchError> {
    if cfg!(debug_assertions) {
        state.verify()
    } else {
        Ok(())
    }
}

/// Asserts in debug builds that `result` is not an invariant violation.
fn tripwire<T>(result: Result<T, MatchError>) -> Result<T, MatchError> {
    debug_assert!(
        !matches!(result, Err(MatchError::InvariantViolation(_))),
        "lobby invariant violated"
    );
    result
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::ThemedNicknames;
    use crate::domain::message::SHUTDOWN_NOTICE;

    fn lobby() -> Lobby {
        Lobby::new(LobbySettings::default(), Arc::new(ThemedNicknames))
    }

    async fn connect(lobby: &Lobby) -> (Registration, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbox, events) = Outbox::channel();
        (lobby.register(outbox).await, events)
    }

    fn nickname_of(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> String {
        let Ok(ServerEvent::Nickname { nickname, .. }) = events.try_recv() else {
            panic!("expected a nickname event");
        };
        nickname
    }

    fn topic(name: &str) -> Topic {
        let Some(topic) = Topic::parse(name) else {
            panic!("valid topic");
        };
        topic
    }

    #[tokio::test]
    async fn zero_idle_timeout_does_not_end_new_sessions() {
        let settings = LobbySettings {
            idle_timeout: Duration::ZERO,
            ..LobbySettings::default()
        };
        let lobby = Lobby::new(settings, Arc::new(ThemedNicknames));
        let (a, _ea) = connect(&lobby).await;
        let (b, _eb) = connect(&lobby).await;
        let _ = lobby.join(a.id, &["gaming"]).await;
        let _ = lobby.join(b.id, &["gaming"]).await;

        let Some(session) = a.assignment.borrow().clone() else {
            panic!("expected a session");
        };
        assert!(!session.idle_remaining().is_zero());
        assert!(session.idle_remaining() <= MIN_IDLE_TIMEOUT);
    }

    #[test]
    fn verify_rejects_misfiled_record() {
        let mut state = LobbyState::default();
        let (outbox, _events) = Outbox::channel();
        let (record, _assignment) = Connection::new(ConnectionId::new(), outbox);
        state.connections.insert(ConnectionId::new(), record);
        assert!(matches!(state.verify(), Err(MatchError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn two_gamers_are_matched() {
        let lobby = lobby();
        let (a, mut ea) = connect(&lobby).await;
        let (b, mut eb) = connect(&lobby).await;

        let Ok(JoinOutcome::Queued { .. }) = lobby.join(a.id, &["gaming"]).await else {
            panic!("join failed");
        };
        let Ok(JoinOutcome::Queued { .. }) = lobby.join(b.id, &["gaming"]).await else {
            panic!("join failed");
        };

        let nick_a = nickname_of(&mut ea);
        let nick_b = nickname_of(&mut eb);
        let Ok(ServerEvent::Matched { partner_nickname, .. }) = ea.try_recv() else {
            panic!("a expected a match notice");
        };
        assert_eq!(partner_nickname, nick_b);
        let Ok(ServerEvent::Matched { partner_nickname, .. }) = eb.try_recv() else {
            panic!("b expected a match notice");
        };
        assert_eq!(partner_nickname, nick_a);

        assert_eq!(lobby.partner_of(a.id).await, Some(b.id));
        assert_eq!(lobby.partner_of(b.id).await, Some(a.id));
        assert!(a.assignment.borrow().is_some());
        assert!(lobby.verify().await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_join_is_ignored() {
        let lobby = lobby();
        let (a, mut ea) = connect(&lobby).await;
        let _ = lobby.join(a.id, &["gaming"]).await;
        let _ = nickname_of(&mut ea);

        let Ok(outcome) = lobby.join(a.id, &["music"]).await else {
            panic!("duplicate join must not fail");
        };
        assert_eq!(outcome, JoinOutcome::Duplicate(ConnectionState::Waiting));
        assert!(ea.try_recv().is_err());
        assert!(lobby.is_waiting_in(a.id, &topic("gaming")).await);
        assert!(!lobby.is_waiting_in(a.id, &topic("music")).await);
    }

    #[tokio::test]
    async fn join_for_unknown_connection_fails() {
        let lobby = lobby();
        let result = lobby.join(ConnectionId::new(), &["gaming"]).await;
        assert!(matches!(result, Err(MatchError::UnknownConnection(_))));
    }

    #[tokio::test]
    async fn disconnect_before_match_clears_pools() {
        let lobby = lobby();
        let (a, _ea) = connect(&lobby).await;
        let _ = lobby.join(a.id, &["gaming", "tech"]).await;

        assert!(matches!(lobby.on_disconnect(a.id).await, Ok(true)));
        assert!(matches!(lobby.on_disconnect(a.id).await, Ok(false)));

        let (b, _eb) = connect(&lobby).await;
        let _ = lobby.join(b.id, &["gaming"]).await;
        assert_eq!(lobby.partner_of(b.id).await, None);
        assert_eq!(lobby.connection_state(a.id).await, None);
        let stats = lobby.stats().await;
        assert_eq!(stats.waiting.get("gaming"), Some(&1));
        assert_eq!(stats.waiting.get("tech"), None);
    }

    #[tokio::test]
    async fn partner_disconnect_requeues_survivor() {
        let lobby = lobby();
        let (a, mut ea) = connect(&lobby).await;
        let (b, _eb) = connect(&lobby).await;
        let _ = lobby.join(a.id, &["gaming", "music"]).await;
        let _ = lobby.join(b.id, &["gaming"]).await;
        let _ = nickname_of(&mut ea);
        let _matched = ea.try_recv();

        let _ = lobby.on_disconnect(b.id).await;

        let Ok(ServerEvent::PartnerLeft { .. }) = ea.try_recv() else {
            panic!("survivor expected a partner-left notice");
        };
        assert_eq!(lobby.connection_state(a.id).await, Some(ConnectionState::Waiting));
        assert!(lobby.is_waiting_in(a.id, &topic("gaming")).await);
        assert!(lobby.is_waiting_in(a.id, &topic("music")).await);
        assert_eq!(lobby.partner_of(a.id).await, None);
        assert_eq!(lobby.partner_of(b.id).await, None);
        assert!(lobby.verify().await.is_ok());
    }

    #[tokio::test]
    async fn survivor_is_rematched_immediately() {
        let lobby = lobby();
        let (a, _ea) = connect(&lobby).await;
        let (b, _eb) = connect(&lobby).await;
        let (c, _ec) = connect(&lobby).await;
        let _ = lobby.join(a.id, &["music"]).await;
        let _ = lobby.join(b.id, &["music"]).await;
        let _ = lobby.join(c.id, &["music"]).await;
        assert_eq!(lobby.connection_state(c.id).await, Some(ConnectionState::Waiting));

        let _ = lobby.on_disconnect(a.id).await;
        assert_eq!(lobby.partner_of(b.id).await, Some(c.id));
        assert!(lobby.verify().await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_forgets_everything() {
        let lobby = lobby();
        let (mut a, mut ea) = connect(&lobby).await;
        let (b, _eb) = connect(&lobby).await;
        let (c, _ec) = connect(&lobby).await;
        for id in [a.id, b.id, c.id] {
            let _ = lobby.join(id, &["random"]).await;
        }

        assert!(a.assignment.borrow_and_update().is_some());

        lobby.shutdown().await;
        let _ = nickname_of(&mut ea);
        let _matched = ea.try_recv();
        let Ok(ServerEvent::PartnerLeft { message, reason }) = ea.try_recv() else {
            panic!("matched client expected a shutdown notice");
        };
        assert_eq!(message, SHUTDOWN_NOTICE);
        assert_eq!(reason, "shutdown");

        let stats = lobby.stats().await;
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.active_sessions, 0);
        assert!(stats.waiting.is_empty());
        assert!(a.assignment.changed().await.is_err());
    }
}
