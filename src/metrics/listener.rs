use std::sync::Arc;

use async_trait::async_trait;

use crate::session::{GroupEvent, GroupListener, Session, SessionEvent, SessionListener};

use super::ConnectionMetrics;

/// Keeps the session and group gauges in step with the indices.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsListener;

#[async_trait]
impl SessionListener for MetricsListener {
    async fn on_event(&self, event: SessionEvent, _session: Arc<Session>) -> anyhow::Result<()> {
        if let SessionEvent::AfterAdd(stats) | SessionEvent::AfterRemove(stats) = event {
            ConnectionMetrics::set_index(stats);
        }
        Ok(())
    }
}

#[async_trait]
impl GroupListener for MetricsListener {
    async fn on_event(&self, event: GroupEvent, _session: Arc<Session>) -> anyhow::Result<()> {
        if let GroupEvent::AfterSub(_, stats) | GroupEvent::AfterUnsub(_, stats) = event {
            ConnectionMetrics::set_index(stats);
        }
        Ok(())
    }
}
