use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::packet::Packet;
use crate::session::{IndexError, Session};

/// Why a handler refused a packet. Reported to the sender as one error packet.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("handler cannot process '{0}' packets")]
    UnexpectedPacket(String),

    #[error("packet cannot be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl HandlerError {
    pub fn title(&self) -> &'static str {
        match self {
            HandlerError::Validation(_) => "invalid packet",
            HandlerError::Forbidden(_) => "forbidden",
            HandlerError::UnexpectedPacket(_) => "unexpected packet",
            HandlerError::Serialization(_) | HandlerError::Index(_) => "internal error",
        }
    }

    pub fn to_packet(&self) -> Packet {
        Packet::error(self.title(), self.to_string())
    }
}

/// Handles every packet of one namespace.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, session: &Arc<Session>, packet: Packet) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_packet() {
        let packet = HandlerError::Validation("content must not be empty".to_string()).to_packet();
        assert_eq!(
            packet,
            Packet::error("invalid packet", "content must not be empty")
        );

        let packet = HandlerError::Index(IndexError::WriterStopped).to_packet();
        assert!(matches!(packet, Packet::Error { ref title, .. } if title == "internal error"));
    }
}
