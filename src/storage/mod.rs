//! Message persistence seam.

use async_trait::async_trait;
use thiserror::Error;

use crate::packet::Packet;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("packet cannot be stored: {0}")]
    Rejected(String),
}

/// Durable store for delivered messages. Callers never wait on it.
#[async_trait]
pub trait MessageStorageService: Send + Sync {
    async fn store(&self, packet: &Packet) -> Result<(), StorageError>;
}

/// Discards every packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMessageStorage;

#[async_trait]
impl MessageStorageService for NoopMessageStorage {
    async fn store(&self, packet: &Packet) -> Result<(), StorageError> {
        tracing::trace!(ns = packet.ns(), "Message storage disabled, dropping packet");
        Ok(())
    }
}
