use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatcher::{HandlerError, PacketHandler};
use crate::packet::Packet;
use crate::session::{Session, SessionRegistry};

/// Answers `ping` with `pong` while the session is still the registered
/// instance for its id; otherwise closes it.
pub struct PingHandler {
    registry: SessionRegistry,
}

impl PingHandler {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PacketHandler for PingHandler {
    async fn handle(&self, session: &Arc<Session>, _packet: Packet) -> Result<(), HandlerError> {
        match self.registry.find_by_id(session.id()) {
            Some(current) if Arc::ptr_eq(&current, session) => {
                // A send failure means the session started closing meanwhile
                let _ = session.send(Packet::Pong).await;
            }
            _ => {
                tracing::warn!(
                    session_id = %session.id(),
                    "Ping from a session that is not registered, closing"
                );
                session.close();
            }
        }

        Ok(())
    }
}
