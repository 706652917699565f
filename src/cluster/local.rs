//! In-process transport; clones share one bus.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::transport::{glob_match, ClusterTransport, Subscription, TransportHandler};
use super::TransportError;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct LocalClusterTransport {
    bus: broadcast::Sender<(String, Arc<[u8]>)>,
}

impl LocalClusterTransport {
    pub fn new(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity.max(1));
        Self { bus }
    }
}

impl Default for LocalClusterTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl ClusterTransport for LocalClusterTransport {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        // No subscriber is not an error
        let _ = self.bus.send((channel.to_string(), payload.into()));
        Ok(())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Subscription, TransportError> {
        let mut rx = self.bus.subscribe();
        let pattern = pattern.to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((channel, payload)) => {
                        if glob_match(&pattern, &channel) {
                            handler.on_message(&channel, &payload).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, pattern = %pattern, "Local cluster subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<(String, Vec<u8>)>);

    #[async_trait]
    impl TransportHandler for Forward {
        async fn on_message(&self, channel: &str, payload: &[u8]) {
            let _ = self.0.send((channel.to_string(), payload.to_vec()));
        }
    }

    #[tokio::test]
    async fn test_pattern_subscription() {
        let transport = LocalClusterTransport::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = transport
            .subscribe("im:user:*", Arc::new(Forward(tx)))
            .await
            .unwrap();

        transport.publish("im:group:1", b"skip".to_vec()).await.unwrap();
        transport.publish("im:user:1", b"take".to_vec()).await.unwrap();

        let (channel, payload) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel, "im:user:1");
        assert_eq!(payload, b"take");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let transport = LocalClusterTransport::new(4);
        assert!(transport.publish("nobody", vec![1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_delivery() {
        let transport = LocalClusterTransport::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = transport
            .subscribe("*", Arc::new(Forward(tx)))
            .await
            .unwrap();
        drop(subscription);
        tokio::task::yield_now().await;

        transport.publish("x", vec![1]).await.unwrap();
        let received = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(!matches!(received, Ok(Some(_))));
    }
}
