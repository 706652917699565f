//! Factory function for creating the cluster transport

use std::sync::Arc;

use crate::config::ClusterConfig;

use super::redis_transport::RedisClusterTransport;
use super::transport::ClusterTransport;

/// Build the transport for the configured mode. `None` means single-node.
pub async fn create_transport(config: &ClusterConfig) -> Option<Arc<dyn ClusterTransport>> {
    if !config.enabled {
        tracing::info!("Cluster mode disabled, running single-node");
        return None;
    }

    match RedisClusterTransport::connect(config).await {
        Ok(transport) => {
            tracing::info!(
                server_id = %config.server_id,
                channel_prefix = %config.channel_prefix,
                "Creating Redis cluster transport"
            );
            Some(Arc::new(transport))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Cluster mode enabled but Redis is not available, falling back to single-node"
            );
            None
        }
    }
}
