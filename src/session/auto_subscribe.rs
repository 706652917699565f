use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::auth::Uid;
use crate::packet::GroupId;

use super::{GroupSubscriptionIndex, Session, SessionEvent, SessionListener};

/// Source of the groups a user belongs to.
#[async_trait]
pub trait GroupMembership: Send + Sync {
    async fn group_ids(&self, uid: Uid) -> anyhow::Result<Vec<GroupId>>;
}

/// In-process membership table.
#[derive(Debug, Default)]
pub struct StaticGroupMembership {
    members: DashMap<Uid, Vec<GroupId>>,
}

impl StaticGroupMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, uid: Uid, group_ids: Vec<GroupId>) {
        self.members.insert(uid, group_ids);
    }
}

#[async_trait]
impl GroupMembership for StaticGroupMembership {
    async fn group_ids(&self, uid: Uid) -> anyhow::Result<Vec<GroupId>> {
        Ok(self
            .members
            .get(&uid)
            .map(|groups| groups.clone())
            .unwrap_or_default())
    }
}

/// Subscribes each newly registered user session to the groups of its uid.
pub struct AutoSubscribeGroups {
    membership: Arc<dyn GroupMembership>,
    groups: GroupSubscriptionIndex,
}

impl AutoSubscribeGroups {
    pub fn new(membership: Arc<dyn GroupMembership>, groups: GroupSubscriptionIndex) -> Self {
        Self { membership, groups }
    }
}

#[async_trait]
impl SessionListener for AutoSubscribeGroups {
    async fn on_event(&self, event: SessionEvent, session: Arc<Session>) -> anyhow::Result<()> {
        let (SessionEvent::AfterAdd(_), Some(uid)) = (event, session.uid()) else {
            return Ok(());
        };

        let group_ids = self.membership.group_ids(uid).await?;
        if group_ids.is_empty() {
            return Ok(());
        }

        let added = self.groups.sub_groups(&session, &group_ids).await?;
        tracing::debug!(
            session_id = %session.id(),
            uid,
            groups = added,
            "Auto-subscribed session to member groups"
        );

        Ok(())
    }
}
