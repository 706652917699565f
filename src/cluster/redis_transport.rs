//! Redis PUBLISH/PSUBSCRIBE transport

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::ClusterConfig;
use crate::metrics::ClusterMetrics;

use super::backoff::ReconnectBackoff;
use super::transport::{ClusterTransport, Subscription, TransportHandler};
use super::TransportError;

pub struct RedisClusterTransport {
    client: redis::Client,
    /// Multiplexed connection for PUBLISH; pub/sub needs its own connection
    publisher: ConnectionManager,
    backoff: ReconnectBackoff,
}

impl RedisClusterTransport {
    pub async fn connect(config: &ClusterConfig) -> Result<Self, TransportError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        tracing::info!("Connected cluster transport to Redis");

        Ok(Self {
            client,
            publisher,
            backoff: ReconnectBackoff::from_config(config),
        })
    }
}

#[async_trait]
impl ClusterTransport for RedisClusterTransport {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut conn = self.publisher.clone();
        let _receivers: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Subscription, TransportError> {
        let client = self.client.clone();
        let pattern = pattern.to_string();

        let task = tokio::spawn(run_subscription(client, pattern, handler, self.backoff.clone()));

        Ok(Subscription::new(task))
    }
}

/// Keep a pattern subscription alive, reconnecting with exponential backoff.
async fn run_subscription(
    client: redis::Client,
    pattern: String,
    handler: Arc<dyn TransportHandler>,
    mut backoff: ReconnectBackoff,
) {
    loop {
        let error = subscribe_once(&client, &pattern, handler.as_ref(), &mut backoff).await;
        let delay = backoff.next_delay();

        tracing::error!(
            error = %error,
            pattern = %pattern,
            retry_delay_ms = delay.as_millis() as u64,
            attempt = backoff.attempt(),
            "Cluster subscription lost, reconnecting"
        );
        ClusterMetrics::record_reconnect();

        tokio::time::sleep(delay).await;
    }
}

/// Runs until the subscription fails; the returned error says why.
async fn subscribe_once(
    client: &redis::Client,
    pattern: &str,
    handler: &dyn TransportHandler,
    backoff: &mut ReconnectBackoff,
) -> TransportError {
    let mut pubsub = match client.get_async_pubsub().await {
        Ok(pubsub) => pubsub,
        Err(e) => return e.into(),
    };
    if let Err(e) = pubsub.psubscribe(pattern).await {
        return e.into();
    }

    backoff.reset();
    tracing::info!(pattern = %pattern, "Subscribed to cluster channels");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        handler
            .on_message(msg.get_channel_name(), msg.get_payload_bytes())
            .await;
    }

    TransportError::StreamEnded
}
