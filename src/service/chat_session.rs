//! One live relay between two matched connections.
//!
//! A [`ChatSession`] is shared (`Arc`) between the two client driver tasks.
//! Each driver runs [`ChatSession::relay`] for its own side: it reads from
//! its own inbox and pushes into the partner's outbox. The Active → Ended
//! transition is published on a `watch` channel so the other side's relay
//! stops as soon as either side ends the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::domain::{
    ClientFrame, ConnectionId, EndReason, Inbox, Outbox, ServerEvent, SessionId, SessionState,
    Topic,
};
use crate::error::MatchError;

/// One side of a chat session.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Nickname shown to the partner.
    pub nickname: String,
    /// Send half of the connection.
    pub outbox: Outbox,
}

/// How a [`ChatSession::relay`] call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Why the session ended.
    pub reason: EndReason,
    /// `true` if this relay performed the Active → Ended transition and is
    /// therefore responsible for requesting teardown.
    pub ended_here: bool,
}

enum Forward {
    Sent,
    Ended,
    Failed,
}

/// Relay state machine for one matched pair.
#[derive(Debug)]
pub struct ChatSession {
    id: SessionId,
    topic: Topic,
    first: Participant,
    second: Participant,
    idle_timeout: Duration,
    started: Instant,
    /// Milliseconds after `started` of the last successful relay.
    last_activity_ms: AtomicU64,
    state: watch::Sender<SessionState>,
}

impl ChatSession {
    /// Creates an active session between `first` and `second`.
    #[must_use]
    pub fn new(topic: Topic, first: Participant, second: Participant, idle_timeout: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            id: SessionId::new(),
            topic,
            first,
            second,
            idle_timeout,
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            state,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Topic the pair was formed on.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Both participants, in pairing order.
    #[must_use]
    pub const fn participants(&self) -> [&Participant; 2] {
        [&self.first, &self.second]
    }

    /// The participant for `conn`, if it belongs to this session.
    #[must_use]
    pub fn participant(&self, conn: ConnectionId) -> Option<&Participant> {
        self.participants().into_iter().find(|p| p.id == conn)
    }

    /// The other participant from `conn`'s point of view.
    #[must_use]
    pub fn partner_of(&self, conn: ConnectionId) -> Option<&Participant> {
        if self.first.id == conn {
            Some(&self.second)
        } else if self.second.id == conn {
            Some(&self.first)
        } else {
            None
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Sends each side a match notice naming its partner.
    ///
    /// Best-effort: a side whose outbox is closed is left for its own
    /// driver to report.
    pub fn announce(&self) {
        let timestamp = Utc::now();
        for (me, partner) in [(&self.first, &self.second), (&self.second, &self.first)] {
            let notice = ServerEvent::Matched {
                partner_nickname: partner.nickname.clone(),
                topic: self.topic.clone(),
                session_id: self.id,
                timestamp,
            };
            if me.outbox.send(notice).is_err() {
                tracing::debug!(connection_id = %me.id, session_id = %self.id, "match notice not delivered");
            }
        }
    }

    /// Performs the Active → Ended transition.
    ///
    /// Returns `true` only for the single call that ended the session; every
    /// later call is a no-op returning `false`.
    pub fn end(&self, reason: EndReason) -> bool {
        let mut ended_here = false;
        self.state.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = SessionState::Ended(reason);
                ended_here = true;
            }
            ended_here
        });
        if ended_here {
            tracing::info!(session_id = %self.id, reason = ?reason, "chat session ended");
        }
        ended_here
    }

    /// Time left before the session counts as idle.
    #[must_use]
    pub fn idle_remaining(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Acquire));
        let idle_for = self.started.elapsed().saturating_sub(last);
        self.idle_timeout.saturating_sub(idle_for)
    }

    fn touch(&self) {
        let now = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_activity_ms.fetch_max(now, Ordering::AcqRel);
    }

    /// Pushes `event` to `to` only while the session is active. The check
    /// and the push happen under the state lock, so nothing is forwarded
    /// once [`ChatSession::end`] has returned.
    fn forward(&self, to: &Participant, event: ServerEvent) -> Forward {
        let mut outcome = Forward::Ended;
        self.state.send_if_modified(|state| {
            if !state.is_ended() {
                outcome = match to.outbox.send(event) {
                    Ok(()) => Forward::Sent,
                    Err(_) => Forward::Failed,
                };
            }
            false
        });
        outcome
    }

    fn finish(&self, reason: EndReason) -> RelayOutcome {
        if self.end(reason) {
            return RelayOutcome {
                reason,
                ended_here: true,
            };
        }
        let reason = match self.state() {
            SessionState::Ended(actual) => actual,
            SessionState::Active => reason,
        };
        RelayOutcome {
            reason,
            ended_here: false,
        }
    }

    /// Relays everything `me` sends to its partner until the session ends.
    ///
    /// Ends the session when `me`'s inbox closes, when forwarding to the
    /// partner fails, or when nothing was relayed for the idle timeout.
    /// Returns as soon as the partner's relay ends it instead.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvariantViolation`] if `me` is not a
    /// participant of this session.
    pub async fn relay<I: Inbox>(
        &self,
        me: ConnectionId,
        inbox: &mut I,
    ) -> Result<RelayOutcome, MatchError> {
        let (Some(sender), Some(partner)) = (self.participant(me), self.partner_of(me)) else {
            return Err(MatchError::invariant(format!(
                "connection {me} relaying in foreign session {}",
                self.id
            )));
        };
        let mut state_rx = self.state.subscribe();

        loop {
            let current = *state_rx.borrow_and_update();
            if let SessionState::Ended(reason) = current {
                return Ok(RelayOutcome {
                    reason,
                    ended_here: false,
                });
            }

            let remaining = self.idle_remaining();
            if remaining.is_zero() {
                return Ok(self.finish(EndReason::IdleTimeout));
            }

            tokio::select! {
                biased;

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Ok(self.finish(EndReason::Shutdown));
                    }
                }
                received = inbox.receive(remaining) => match received {
                    Ok(raw) => match ClientFrame::chat(&raw) {
                        ClientFrame::Message { text } => {
                            match self.forward(partner, ServerEvent::chat(&sender.nickname, &text)) {
                                Forward::Sent => self.touch(),
                                Forward::Ended => {
                                    tracing::debug!(connection_id = %me, session_id = %self.id, "message after session end dropped");
                                }
                                Forward::Failed => {
                                    return Ok(self.finish(EndReason::Disconnected(partner.id)));
                                }
                            }
                        }
                        ClientFrame::Join { .. } => {
                            tracing::debug!(connection_id = %me, "join while matched ignored");
                        }
                    },
                    Err(MatchError::Timeout) => {}
                    Err(_) => return Ok(self.finish(EndReason::Disconnected(me))),
                },
            }
        }
    }
}
