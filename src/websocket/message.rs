use std::sync::Arc;

use crate::packet::Packet;

/// Close codes sent by the server.
pub mod close_code {
    /// Authorization header present but unparseable
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Authentication failed
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Session could not be registered
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const NORMAL: u16 = 1000;
}

/// Item of a session's outbound queue, drained by the connection's writer task.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Packet(Packet),
    /// Pre-serialized packet, shared across a fan-out
    Serialized(Arc<str>),
    Close { code: u16, reason: String },
}

impl OutboundMessage {
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }
}
