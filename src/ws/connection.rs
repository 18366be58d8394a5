//! WebSocket connection plumbing.
//!
//! Splits a socket into a reader the client driver pulls from and a writer
//! task draining the connection's outbox, so lobby critical sections never
//! wait on the network.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::{Inbox, Outbox, ServerEvent};
use crate::error::MatchError;
use crate::service::{Lobby, drive_client};

/// [`Inbox`] over the read half of a WebSocket.
///
/// Yields text frames; ping, pong and binary frames are skipped. A close
/// frame, the end of the stream or a protocol error closes the inbox.
pub struct WsInbox {
    stream: SplitStream<WebSocket>,
}

impl WsInbox {
    /// Wraps the read half of a socket.
    #[must_use]
    pub const fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

impl fmt::Debug for WsInbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsInbox").finish_non_exhaustive()
    }
}

impl Inbox for WsInbox {
    async fn next_text(&mut self) -> Result<String, MatchError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) | None => return Err(MatchError::ConnectionClosed),
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "ws read failed");
                    return Err(MatchError::ConnectionClosed);
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Serves one WebSocket client until it disconnects.
///
/// - Spawns the writer task that serialises outbound events.
/// - Runs the client driver on the read half.
/// - Reports an invariant failure to the client as an `error` event.
/// - Gives the writer `flush_grace` to deliver what is queued, then closes.
pub async fn run_connection(
    socket: WebSocket,
    lobby: Arc<Lobby>,
    join_timeout: Duration,
    flush_grace: Duration,
) {
    let (ws_tx, ws_rx) = socket.split();
    let (outbox, events) = Outbox::channel();
    let mut writer = tokio::spawn(write_events(ws_tx, events));

    let report = outbox.clone();
    if let Err(err) = drive_client(lobby, outbox, WsInbox::new(ws_rx), join_timeout).await {
        tracing::error!(error = %err, code = err.error_code(), "closing ws connection");
        let _ = report.send(ServerEvent::Error {
            code: err.error_code(),
            message: err.to_string(),
        });
    }
    drop(report);

    if tokio::time::timeout(flush_grace, &mut writer).await.is_err() {
        tracing::debug!("ws writer did not flush in time");
        writer.abort();
    }
    tracing::debug!("ws connection closed");
}

/// Drains `events` into the socket until every outbox clone is dropped or
/// the socket fails, then sends a close frame.
async fn write_events(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = events.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialise outbound event");
                continue;
            }
        };
        if ws_tx.send(Message::text(json)).await.is_err() {
            tracing::debug!("ws write failed");
            return;
        }
    }
    let _ = ws_tx.close().await;
}
