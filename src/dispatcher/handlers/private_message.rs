use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::RouteTarget;
use crate::dispatcher::{fan_out, HandlerError, PacketHandler};
use crate::metrics::PacketMetrics;
use crate::packet::Packet;
use crate::session::Session;

use super::checker::prepare_message;
use super::HandlerContext;

/// Delivers `p.message` to every session of the target uid.
pub struct PrivateMessageHandler {
    ctx: HandlerContext,
}

impl PrivateMessageHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PacketHandler for PrivateMessageHandler {
    async fn handle(&self, session: &Arc<Session>, packet: Packet) -> Result<(), HandlerError> {
        let mut message = match packet {
            Packet::PrivateMessage(message) => message,
            other => return Err(HandlerError::UnexpectedPacket(other.ns().to_string())),
        };

        prepare_message(session, &mut message, &self.ctx.message)?;
        let to = message.to;

        let packet = Packet::PrivateMessage(message);
        let text: Arc<str> = packet.to_json()?.into();

        self.ctx.store(packet.clone());

        let recipients = self.ctx.registry.find_by_uid(to);
        let result = fan_out(recipients, text).await;
        PacketMetrics::record_delivered("private", result.delivered as u64);
        PacketMetrics::record_delivery_failed(result.failed as u64);

        tracing::debug!(
            session_id = %session.id(),
            to,
            delivered = result.delivered,
            "Private message delivered"
        );

        self.ctx.forward(RouteTarget::User(to), &packet).await;

        Ok(())
    }
}
