//! Service layer: the lobby and the tasks that drive it.
//!
//! [`Lobby`] owns all shared matchmaking state. [`Matchmaker`] and
//! [`LifecycleCoordinator`] run inside its critical sections; each
//! [`ChatSession`] relays one pair outside of them; [`drive_client`] is the
//! per-connection task tying it together.

pub mod chat_session;
pub mod client;
pub mod connection;
pub mod lifecycle;
pub mod lobby;
pub mod matchmaker;

pub use chat_session::{ChatSession, Participant, RelayOutcome};
pub use client::drive_client;
pub use connection::{Assignment, Connection};
pub use lifecycle::LifecycleCoordinator;
pub use lobby::{JoinOutcome, Lobby, LobbySettings, LobbyState, LobbyStats, Registration};
pub use matchmaker::Matchmaker;
