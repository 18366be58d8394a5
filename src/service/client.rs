//! Per-connection driver task.
//!
//! [`drive_client`] is the one long-lived task behind every client. It reads
//! the topic selection, then cycles between waiting for a partner and
//! relaying a session until the client goes away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use super::chat_session::ChatSession;
use super::connection::Assignment;
use super::lobby::{JoinOutcome, Lobby, Registration};
use crate::domain::{ClientFrame, ConnectionId, Inbox, Outbox, SessionId};
use crate::error::MatchError;

/// Drives one client from registration to disconnect.
///
/// The first inbound message must arrive within `join_timeout` and is read
/// as the topic selection. Cleanup through [`Lobby::on_disconnect`] runs on
/// every exit path. Transport failures are a normal end of the connection
/// and return `Ok`.
///
/// # Errors
///
/// Returns [`MatchError::InvariantViolation`] when the lobby's bookkeeping
/// breaks while serving this client; the caller reports it and closes the
/// transport.
pub async fn drive_client<I: Inbox>(
    lobby: Arc<Lobby>,
    outbox: Outbox,
    mut inbox: I,
    join_timeout: Duration,
) -> Result<(), MatchError> {
    let Registration { id, mut assignment } = lobby.register(outbox).await;
    tracing::debug!(connection_id = %id, "client driver started");

    let served = serve(&lobby, id, &mut assignment, &mut inbox, join_timeout)
        .instrument(tracing::info_span!("client", connection_id = %id))
        .await;
    let cleaned = lobby.on_disconnect(id).await;
    tracing::debug!(connection_id = %id, "client driver finished");

    match served {
        Err(err) if err.is_transport() => cleaned.map(|_| ()),
        Err(err) => Err(err),
        Ok(()) => cleaned.map(|_| ()),
    }
}

async fn serve<I: Inbox>(
    lobby: &Lobby,
    id: ConnectionId,
    assignment: &mut watch::Receiver<Assignment>,
    inbox: &mut I,
    join_timeout: Duration,
) -> Result<(), MatchError> {
    let first = tokio::select! {
        first = inbox.receive(join_timeout) => first?,
        () = released(assignment) => return Err(MatchError::ConnectionClosed),
    };
    join(lobby, id, &ClientFrame::selection(&first)).await?;

    let mut previous = None;
    loop {
        let session = wait_for_partner(lobby, id, assignment, inbox, previous).await?;
        previous = Some(session.id());

        let outcome = session.relay(id, inbox).await?;
        if outcome.reason.is_gone(id) {
            return Err(MatchError::ConnectionClosed);
        }
        if outcome.ended_here {
            lobby.on_session_ended(&session).await?;
        }
    }
}

/// Waits until the lobby publishes a session other than `previous`.
///
/// Inbound messages meanwhile are handled, not buffered: a join frame is
/// passed to the lobby (and ignored if the client is already queued) and
/// chat text is dropped.
async fn wait_for_partner<I: Inbox>(
    lobby: &Lobby,
    id: ConnectionId,
    assignment: &mut watch::Receiver<Assignment>,
    inbox: &mut I,
    previous: Option<SessionId>,
) -> Result<Arc<ChatSession>, MatchError> {
    loop {
        tokio::select! {
            assigned = fresh_assignment(assignment, previous) => {
                return assigned?.ok_or_else(|| MatchError::invariant(format!(
                    "connection {id} woke without a session"
                )));
            }
            received = inbox.next_text() => match ClientFrame::chat(&received?) {
                ClientFrame::Join { topics } => join(lobby, id, &topics).await?,
                ClientFrame::Message { .. } => {
                    tracing::debug!(connection_id = %id, "chat while unmatched dropped");
                }
            },
        }
    }
}

/// Resolves with the first published session other than `previous`, or
/// fails once the lobby has dropped the connection record.
async fn fresh_assignment(
    assignment: &mut watch::Receiver<Assignment>,
    previous: Option<SessionId>,
) -> Result<Assignment, MatchError> {
    let current = assignment
        .wait_for(|a| a.as_ref().is_some_and(|s| Some(s.id()) != previous))
        .await
        .map_err(|_| MatchError::ConnectionClosed)?;
    Ok(current.clone())
}

/// Resolves once the lobby has dropped the connection record.
async fn released(assignment: &mut watch::Receiver<Assignment>) {
    let _ = assignment.wait_for(|_| false).await;
}

async fn join(lobby: &Lobby, id: ConnectionId, topics: &[String]) -> Result<(), MatchError> {
    match lobby.join(id, topics).await? {
        JoinOutcome::Queued { .. } => {}
        JoinOutcome::Duplicate(state) => {
            tracing::debug!(connection_id = %id, ?state, error = %MatchError::DuplicateJoin, "join absorbed");
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::domain::{ChannelInbox, ServerEvent, ThemedNicknames};
    use crate::service::lobby::LobbySettings;

    struct Client {
        input: mpsc::UnboundedSender<String>,
        events: mpsc::UnboundedReceiver<ServerEvent>,
        task: JoinHandle<Result<(), MatchError>>,
    }

    fn lobby(idle_timeout: Duration) -> Arc<Lobby> {
        let settings = LobbySettings {
            idle_timeout,
            ..LobbySettings::default()
        };
        Arc::new(Lobby::new(settings, Arc::new(ThemedNicknames)))
    }

    fn spawn(lobby: &Arc<Lobby>, selection: &str) -> Client {
        let (outbox, events) = Outbox::channel();
        let (input, inbox) = ChannelInbox::channel();
        let _ = input.send(selection.to_string());
        let task = tokio::spawn(drive_client(
            Arc::clone(lobby),
            outbox,
            inbox,
            Duration::from_secs(120),
        ));
        Client {
            input,
            events,
            task,
        }
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        let Some(event) = events.recv().await else {
            panic!("event stream closed");
        };
        event
    }

    async fn nickname(client: &mut Client) -> String {
        let ServerEvent::Nickname { nickname, .. } = next(&mut client.events).await else {
            panic!("expected a nickname event");
        };
        nickname
    }

    async fn matched(client: &mut Client) -> String {
        let ServerEvent::Matched {
            partner_nickname, ..
        } = next(&mut client.events).await
        else {
            panic!("expected a match notice");
        };
        partner_nickname
    }

    #[tokio::test]
    async fn matched_clients_chat() {
        let lobby = lobby(Duration::from_secs(300));
        let mut a = spawn(&lobby, r#"{"type":"join","topics":["gaming"]}"#);
        let nick_a = nickname(&mut a).await;
        let mut b = spawn(&lobby, "Gaming");
        let nick_b = nickname(&mut b).await;

        assert_eq!(matched(&mut a).await, nick_b);
        assert_eq!(matched(&mut b).await, nick_a);

        let _ = a.input.send("hi".to_string());
        let ServerEvent::Message { from, text, line } = next(&mut b.events).await else {
            panic!("expected a chat message");
        };
        assert_eq!(from, nick_a);
        assert_eq!(text, "hi");
        assert_eq!(line, format!("{nick_a}: hi"));

        let _ = b.input.send(r#"{"type":"message","text":"hello"}"#.to_string());
        let ServerEvent::Message { text, .. } = next(&mut a.events).await else {
            panic!("expected a chat message");
        };
        assert_eq!(text, "hello");
        assert!(a.events.try_recv().is_err());
        assert!(b.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn survivor_is_requeued_after_partner_leaves() {
        let lobby = lobby(Duration::from_secs(300));
        let mut a = spawn(&lobby, "gaming, music");
        let _ = nickname(&mut a).await;
        let mut b = spawn(&lobby, "gaming");
        let _ = nickname(&mut b).await;
        let _ = matched(&mut a).await;

        drop(b.input);
        let Ok(Ok(())) = b.task.await else {
            panic!("b's driver should end cleanly");
        };

        let ServerEvent::PartnerLeft { reason, .. } = next(&mut a.events).await else {
            panic!("expected a partner-left notice");
        };
        assert_eq!(reason, "partner_disconnected");
        let stats = lobby.stats().await;
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.waiting.get("gaming"), Some(&1));
        assert_eq!(stats.waiting.get("music"), Some(&1));
        assert_eq!(stats.waiting.len(), 2);

        let mut c = spawn(&lobby, "music");
        let nick_c = nickname(&mut c).await;
        assert_eq!(matched(&mut a).await, nick_c);
        assert!(lobby.stats().await.waiting.is_empty());
    }

    #[tokio::test]
    async fn chat_before_match_is_dropped() {
        let lobby = lobby(Duration::from_secs(300));
        let mut a = spawn(&lobby, "tech");
        let _ = nickname(&mut a).await;
        let _ = a.input.send("anyone?".to_string());
        let _ = a.input.send(r#"{"type":"join","topics":["music"]}"#.to_string());
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let mut b = spawn(&lobby, "tech");
        let _ = nickname(&mut b).await;
        let _ = matched(&mut b).await;
        let _ = matched(&mut a).await;
        assert!(b.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_requeues_both_sides() {
        let lobby = lobby(Duration::from_secs(300));
        let mut a = spawn(&lobby, "movies");
        let _ = nickname(&mut a).await;
        let mut b = spawn(&lobby, "movies");
        let _ = nickname(&mut b).await;
        let _ = matched(&mut a).await;
        let _ = matched(&mut b).await;

        for client in [&mut a, &mut b] {
            let ServerEvent::PartnerLeft { reason, .. } = next(&mut client.events).await else {
                panic!("expected a partner-left notice");
            };
            assert_eq!(reason, "idle_timeout");
        }
        // Both sides go back to the same topic and meet again.
        let _ = matched(&mut a).await;
        let _ = matched(&mut b).await;
        assert_eq!(lobby.stats().await.active_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_is_dropped_after_join_timeout() {
        let lobby = lobby(Duration::from_secs(300));
        let (outbox, _events) = Outbox::channel();
        let (_input, inbox) = ChannelInbox::channel();
        let task = tokio::spawn(drive_client(
            Arc::clone(&lobby),
            outbox,
            inbox,
            Duration::from_secs(120),
        ));
        let Ok(Ok(())) = task.await else {
            panic!("join timeout should end the driver cleanly");
        };
        assert_eq!(lobby.stats().await.connections, 0);
    }

    #[tokio::test]
    async fn shutdown_releases_client_that_never_joined() {
        let lobby = lobby(Duration::from_secs(300));
        let (outbox, _events) = Outbox::channel();
        let (_input, inbox) = ChannelInbox::channel();
        let task = tokio::spawn(drive_client(
            Arc::clone(&lobby),
            outbox,
            inbox,
            Duration::from_secs(120),
        ));
        while lobby.stats().await.connections == 0 {
            tokio::task::yield_now().await;
        }

        lobby.shutdown().await;
        let Ok(Ok(())) = task.await else {
            panic!("driver should end after shutdown");
        };
    }

    #[tokio::test]
    async fn shutdown_releases_every_driver() {
        let lobby = lobby(Duration::from_secs(300));
        let mut a = spawn(&lobby, "random");
        let _ = nickname(&mut a).await;
        let mut b = spawn(&lobby, "random");
        let _ = nickname(&mut b).await;
        let _ = matched(&mut a).await;
        let mut c = spawn(&lobby, "random");
        let _ = nickname(&mut c).await;

        lobby.shutdown().await;
        for client in [a, b, c] {
            let Ok(Ok(())) = client.task.await else {
                panic!("driver should end after shutdown");
            };
        }
        assert_eq!(lobby.stats().await.connections, 0);
    }
}
