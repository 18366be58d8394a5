//! The two halves of a client connection as seen by the lobby.
//!
//! [`Outbox`] is the non-blocking send half: an unbounded queue drained by
//! the transport's writer task. [`Inbox`] is the receive half, owned by the
//! connection's driver task. A transport implements [`Inbox`] for its read
//! side and hands the lobby an [`Outbox`] for its write side.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use super::ServerEvent;
use crate::error::MatchError;

/// Cloneable send half of a connection.
///
/// Sending never blocks. A send fails with [`MatchError::ConnectionClosed`]
/// once the transport's writer has gone away.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Outbox {
    /// Wraps the sending side of a transport's outbound queue.
    #[must_use]
    pub const fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { sender }
    }

    /// Creates an outbox together with the receiver a writer task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    /// Queues `event` for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::ConnectionClosed`] if the writer is gone.
    pub fn send(&self, event: ServerEvent) -> Result<(), MatchError> {
        self.sender
            .send(event)
            .map_err(|_| MatchError::ConnectionClosed)
    }

    /// Returns `true` once the writer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receive half of a connection.
pub trait Inbox: Send {
    /// Waits for the next text message.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a message.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::ConnectionClosed`] when the peer closed the
    /// channel or the transport failed.
    fn next_text(&mut self) -> impl Future<Output = Result<String, MatchError>> + Send;

    /// Waits at most `timeout` for the next text message.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Timeout`] when the deadline passes first and
    /// [`MatchError::ConnectionClosed`] as for [`Inbox::next_text`].
    fn receive(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, MatchError>> + Send {
        async move {
            tokio::time::timeout(timeout, self.next_text())
                .await
                .map_err(|_| MatchError::Timeout)?
        }
    }
}

/// In-process [`Inbox`] backed by an unbounded channel.
///
/// Dropping the paired sender closes the inbox. Used to drive the lobby
/// without a network transport.
#[derive(Debug)]
pub struct ChannelInbox {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ChannelInbox {
    /// Creates an inbox and the sender that feeds it.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }
}

impl Inbox for ChannelInbox {
    async fn next_text(&mut self) -> Result<String, MatchError> {
        self.receiver.recv().await.ok_or(MatchError::ConnectionClosed)
    }
}
