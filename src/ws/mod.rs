//! WebSocket layer: upgrade handler and per-socket plumbing.
//!
//! The endpoint at `/ws` turns each socket into an [`crate::domain::Inbox`]
//! plus an [`crate::domain::Outbox`] drained by a writer task, then hands
//! both to [`crate::service::drive_client`].

pub mod connection;
pub mod handler;
