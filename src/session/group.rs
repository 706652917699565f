use std::sync::Arc;

use crate::packet::GroupId;

use super::listener::ListenerSet;
use super::writer::IndexError;
use super::{GroupEvent, GroupListener, IndexWriter, Session};

/// Sessions subscribed to each group id.
#[derive(Clone)]
pub struct GroupSubscriptionIndex {
    writer: IndexWriter,
    listeners: Arc<ListenerSet<dyn GroupListener>>,
}

impl GroupSubscriptionIndex {
    pub fn new(writer: IndexWriter) -> Self {
        Self {
            writer,
            listeners: Arc::new(ListenerSet::default()),
        }
    }

    pub async fn register_listener(&self, listener: Arc<dyn GroupListener>) {
        tracing::debug!(listener = listener.name(), "Group listener registered");
        self.listeners.push(listener).await;
    }

    /// Subscribe to each group in order, one writer step per group. Returns
    /// how many subscriptions were new.
    pub async fn sub_groups(
        &self,
        session: &Arc<Session>,
        group_ids: &[GroupId],
    ) -> Result<usize, IndexError> {
        let mut added = 0;

        for &group_id in group_ids {
            self.listeners
                .notify(GroupEvent::BeforeSub(group_id), session)
                .await;

            if self.writer.subscribe(session.clone(), group_id).await? {
                added += 1;
                tracing::debug!(session_id = %session.id(), group_id, "Subscribed to group");
                self.listeners
                    .notify(GroupEvent::AfterSub(group_id, self.writer.state().stats()), session)
                    .await;
            }
        }

        Ok(added)
    }

    /// Counterpart of [`sub_groups`](Self::sub_groups). Returns how many
    /// subscriptions were removed.
    pub async fn unsub_groups(
        &self,
        session: &Arc<Session>,
        group_ids: &[GroupId],
    ) -> Result<usize, IndexError> {
        let mut removed = 0;

        for &group_id in group_ids {
            self.listeners
                .notify(GroupEvent::BeforeUnsub(group_id), session)
                .await;

            if self.writer.unsubscribe(session.clone(), group_id).await? {
                removed += 1;
                tracing::debug!(session_id = %session.id(), group_id, "Unsubscribed from group");
                self.listeners
                    .notify(
                        GroupEvent::AfterUnsub(group_id, self.writer.state().stats()),
                        session,
                    )
                    .await;
            }
        }

        Ok(removed)
    }

    pub fn find_by_group_id(&self, group_id: GroupId) -> Vec<Arc<Session>> {
        self.writer
            .state()
            .groups
            .get(&group_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, group_id: GroupId) -> usize {
        self.writer
            .state()
            .groups
            .get(&group_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Number of groups with at least one subscriber
    pub fn group_count(&self) -> usize {
        self.writer.state().groups.len()
    }
}
