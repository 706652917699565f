//! Session registry and group subscription index.
//!
//! Both indices share one [`IndexWriter`]: every mutation is a message to a
//! single task, reads go straight to the concurrent maps.

mod auto_subscribe;
mod group;
mod handle;
mod id;
mod listener;
mod registry;
mod writer;

pub use auto_subscribe::{AutoSubscribeGroups, GroupMembership, StaticGroupMembership};
pub use group::GroupSubscriptionIndex;
pub use handle::{SendError, Session, SessionId, SessionState};
pub use id::{LocalSessionIdGenerator, SessionIdGenerator};
pub use listener::{GroupEvent, GroupListener, IndexStats, SessionEvent, SessionListener};
pub use registry::{AddOutcome, RegistryError, SessionRegistry, UidSessions};
pub use writer::{IndexError, IndexWriter};
