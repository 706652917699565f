use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::TransportError;

/// Receives messages of a subscription, one at a time.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    async fn on_message(&self, channel: &str, payload: &[u8]);
}

/// Publish/subscribe bus between instances.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Deliver every message whose channel matches the glob `pattern` to
    /// `handler` until the returned [`Subscription`] is dropped.
    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<Subscription, TransportError>;
}

/// Background subscription task; aborted on drop.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Redis-style glob match supporting `*` only.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let (p, t) = (pattern.as_bytes(), text.as_bytes());
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, mark)) = backtrack {
            pi = star + 1;
            ti = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}
