//! Built-in packet handlers.

mod checker;
mod group_message;
mod ping;
mod private_message;
mod subscription;

use std::sync::Arc;

use crate::cluster::{ClusterRouter, RouteTarget};
use crate::config::MessageConfig;
use crate::metrics::PacketMetrics;
use crate::packet::{namespace, Packet};
use crate::session::{GroupSubscriptionIndex, SessionRegistry};
use crate::storage::MessageStorageService;

use super::DispatcherBuilder;

pub use group_message::GroupMessageHandler;
pub use ping::PingHandler;
pub use private_message::PrivateMessageHandler;
pub use subscription::{GroupSubscribeHandler, GroupUnsubscribeHandler};

/// Collaborators shared by the built-in handlers.
#[derive(Clone)]
pub struct HandlerContext {
    pub registry: SessionRegistry,
    pub groups: GroupSubscriptionIndex,
    pub storage: Arc<dyn MessageStorageService>,
    /// Present only in cluster mode
    pub router: Option<Arc<ClusterRouter>>,
    pub message: MessageConfig,
}

impl HandlerContext {
    /// Persist without waiting; failures are only logged.
    fn store(&self, packet: Packet) {
        let storage = self.storage.clone();
        tokio::spawn(async move {
            if let Err(e) = storage.store(&packet).await {
                PacketMetrics::record_storage_failure();
                tracing::warn!(error = %e, ns = packet.ns(), "Failed to store message");
            }
        });
    }

    /// Publish to the other instances when clustered; failures are only logged.
    async fn forward(&self, target: RouteTarget, packet: &Packet) {
        let Some(router) = &self.router else {
            return;
        };

        if let Err(e) = router.forward(target, packet).await {
            tracing::warn!(error = %e, target = ?target, "Failed to forward packet to cluster");
        }
    }
}

pub(super) fn install(builder: DispatcherBuilder, ctx: HandlerContext) -> DispatcherBuilder {
    builder
        .handler(
            namespace::PING,
            Arc::new(PingHandler::new(ctx.registry.clone())),
        )
        .handler(
            namespace::PRIVATE_MESSAGE,
            Arc::new(PrivateMessageHandler::new(ctx.clone())),
        )
        .handler(
            namespace::GROUP_MESSAGE,
            Arc::new(GroupMessageHandler::new(ctx.clone())),
        )
        .handler(
            namespace::GROUP_SUBSCRIBE,
            Arc::new(GroupSubscribeHandler::new(ctx.groups.clone())),
        )
        .handler(
            namespace::GROUP_UNSUBSCRIBE,
            Arc::new(GroupUnsubscribeHandler::new(ctx.groups)),
        )
}
