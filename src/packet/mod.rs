//! Wire protocol: JSON text frames discriminated by `@ns`.

mod codec;
pub mod namespace;
mod types;

pub use codec::DecodeError;
pub use types::{ContentType, GroupId, MessagePacket, Packet};
