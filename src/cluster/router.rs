//! Cross-instance forwarding of private and group messages.
//!
//! Each published packet lands on `<prefix>:user:<uid>` or
//! `<prefix>:group:<gid>`; every instance pattern-subscribes to `<prefix>:*`
//! and delivers what it receives to its own sessions without republishing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ClusterConfig;
use crate::dispatcher::try_fan_out;
use crate::metrics::{ClusterMetrics, PacketMetrics};
use crate::packet::Packet;
use crate::session::{GroupSubscriptionIndex, Session, SessionRegistry};

use super::transport::{ClusterTransport, Subscription, TransportHandler};
use super::{RouteTarget, RoutedPacket, TransportError};

pub struct ClusterRouter {
    server_id: String,
    channel_prefix: String,
    transport: Arc<dyn ClusterTransport>,
    registry: SessionRegistry,
    groups: GroupSubscriptionIndex,
}

impl ClusterRouter {
    pub fn new(
        config: &ClusterConfig,
        transport: Arc<dyn ClusterTransport>,
        registry: SessionRegistry,
        groups: GroupSubscriptionIndex,
    ) -> Self {
        Self {
            server_id: config.server_id.clone(),
            channel_prefix: config.channel_prefix.clone(),
            transport,
            registry,
            groups,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn channel_for(&self, target: RouteTarget) -> String {
        match target {
            RouteTarget::User(uid) => format!("{}:user:{}", self.channel_prefix, uid),
            RouteTarget::Group(group_id) => format!("{}:group:{}", self.channel_prefix, group_id),
        }
    }

    /// Subscribe to every routed channel. Delivery stops when the returned
    /// subscription is dropped.
    pub async fn start(self: &Arc<Self>) -> Result<Subscription, TransportError> {
        let pattern = format!("{}:*", self.channel_prefix);
        let subscription = self
            .transport
            .subscribe(&pattern, self.clone() as Arc<dyn TransportHandler>)
            .await?;

        tracing::info!(
            server_id = %self.server_id,
            pattern = %pattern,
            "Cluster router started"
        );

        Ok(subscription)
    }

    /// Publish a packet for the other instances.
    pub async fn forward(&self, target: RouteTarget, packet: &Packet) -> Result<(), TransportError> {
        let routed = RoutedPacket {
            from_server: self.server_id.clone(),
            target,
            packet: packet.clone(),
        };
        let payload = serde_json::to_vec(&routed)?;

        self.transport
            .publish(&self.channel_for(target), payload)
            .await?;
        ClusterMetrics::record_forwarded();

        Ok(())
    }

    /// Deliver a packet received from another instance to local sessions.
    /// Returns the number of sessions it was enqueued to. Never waits for
    /// queue space, so one full session cannot stall the subscription.
    pub fn deliver_local(&self, routed: RoutedPacket) -> usize {
        if routed.from_server == self.server_id {
            return 0;
        }

        ClusterMetrics::record_received();

        let recipients: Vec<Arc<Session>> = match routed.target {
            RouteTarget::User(uid) => self.registry.find_by_uid(uid).into_vec(),
            RouteTarget::Group(group_id) => self.groups.find_by_group_id(group_id),
        };
        if recipients.is_empty() {
            return 0;
        }

        let text: Arc<str> = match routed.packet.to_json() {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    from_server = %routed.from_server,
                    "Routed packet cannot be serialized"
                );
                return 0;
            }
        };

        let result = try_fan_out(recipients, text);
        PacketMetrics::record_delivered("cluster", result.delivered as u64);
        PacketMetrics::record_delivery_failed(result.failed as u64);

        tracing::debug!(
            from_server = %routed.from_server,
            target = ?routed.target,
            delivered = result.delivered,
            failed = result.failed,
            "Handled routed packet"
        );

        result.delivered
    }
}

#[async_trait]
impl TransportHandler for ClusterRouter {
    async fn on_message(&self, channel: &str, payload: &[u8]) {
        let routed: RoutedPacket = match serde_json::from_slice(payload) {
            Ok(routed) => routed,
            Err(e) => {
                tracing::warn!(error = %e, channel = %channel, "Failed to parse routed packet");
                return;
            }
        };

        self.deliver_local(routed);
    }
}
