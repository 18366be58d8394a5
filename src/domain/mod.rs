//! Domain layer: identities, topics, waiting pool, session registry and
//! wire messages.
//!
//! Everything here is plain data guarded by the caller. The lobby in
//! [`crate::service`] owns the only lock and drives these types from inside
//! its critical sections.

pub mod handle;
pub mod ids;
pub mod message;
pub mod nickname;
pub mod session_registry;
pub mod state;
pub mod topic;
pub mod waiting_pool;

pub use handle::{ChannelInbox, Inbox, Outbox};
pub use ids::{ConnectionId, SessionId};
pub use message::{ClientFrame, ServerEvent};
pub use nickname::{NicknameProvider, ThemedNicknames};
pub use session_registry::{Pairing, SessionRegistry};
pub use state::{ConnectionState, EndReason, SessionState};
pub use topic::{Topic, TopicSet};
pub use waiting_pool::WaitingPool;
