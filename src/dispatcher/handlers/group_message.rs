use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::RouteTarget;
use crate::dispatcher::{fan_out, HandlerError, PacketHandler};
use crate::metrics::PacketMetrics;
use crate::packet::Packet;
use crate::session::Session;

use super::checker::prepare_message;
use super::HandlerContext;

/// Delivers `g.message` to every subscriber of the target group, the sender
/// included when subscribed. Serialized once per message.
pub struct GroupMessageHandler {
    ctx: HandlerContext,
}

impl GroupMessageHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PacketHandler for GroupMessageHandler {
    async fn handle(&self, session: &Arc<Session>, packet: Packet) -> Result<(), HandlerError> {
        let mut message = match packet {
            Packet::GroupMessage(message) => message,
            other => return Err(HandlerError::UnexpectedPacket(other.ns().to_string())),
        };

        prepare_message(session, &mut message, &self.ctx.message)?;
        let group_id = message.to;

        let packet = Packet::GroupMessage(message);
        let text: Arc<str> = packet.to_json()?.into();

        self.ctx.store(packet.clone());

        let subscribers = self.ctx.groups.find_by_group_id(group_id);
        let result = fan_out(subscribers, text).await;
        PacketMetrics::record_delivered("group", result.delivered as u64);
        PacketMetrics::record_delivery_failed(result.failed as u64);

        tracing::debug!(
            session_id = %session.id(),
            group_id,
            delivered = result.delivered,
            "Group message delivered"
        );

        self.ctx.forward(RouteTarget::Group(group_id), &packet).await;

        Ok(())
    }
}
