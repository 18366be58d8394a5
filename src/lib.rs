//! # topic-match-gateway
//!
//! WebSocket gateway that anonymously pairs strangers who share an interest
//! topic and relays their chat until one of them leaves.
//!
//! Clients connect to `/ws`, send a topic selection, and wait. The lobby pairs
//! waiting clients per topic in arrival order, tells each side its partner's
//! nickname, and relays messages between them. When a session ends (a client
//! leaves, the pair goes quiet, or a send fails), every reachable side is
//! notified and goes back to waiting under the topics it originally chose.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── System Handlers (api/)
//!     ├── WS Handler + writer task (ws/)
//!     │
//!     ├── drive_client, one task per connection (service/)
//!     ├── ChatSession relay (service/)
//!     │
//!     ├── Lobby: one mutex over (service/)
//!     │     ├── connection table
//!     │     ├── WaitingPool (domain/)
//!     │     └── SessionRegistry (domain/)
//!     │
//!     └── Matchmaker + LifecycleCoordinator (service/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
