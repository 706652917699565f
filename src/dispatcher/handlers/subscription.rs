use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatcher::{HandlerError, PacketHandler};
use crate::packet::Packet;
use crate::session::{GroupSubscriptionIndex, Session};

pub struct GroupSubscribeHandler {
    groups: GroupSubscriptionIndex,
}

impl GroupSubscribeHandler {
    pub fn new(groups: GroupSubscriptionIndex) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl PacketHandler for GroupSubscribeHandler {
    async fn handle(&self, session: &Arc<Session>, packet: Packet) -> Result<(), HandlerError> {
        let group_ids = match packet {
            Packet::GroupSubscribe { group_ids } => group_ids,
            other => return Err(HandlerError::UnexpectedPacket(other.ns().to_string())),
        };

        if !group_ids.is_empty() {
            self.groups.sub_groups(session, &group_ids).await?;
        }
        Ok(())
    }
}

pub struct GroupUnsubscribeHandler {
    groups: GroupSubscriptionIndex,
}

impl GroupUnsubscribeHandler {
    pub fn new(groups: GroupSubscriptionIndex) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl PacketHandler for GroupUnsubscribeHandler {
    async fn handle(&self, session: &Arc<Session>, packet: Packet) -> Result<(), HandlerError> {
        let group_ids = match packet {
            Packet::GroupUnsubscribe { group_ids } => group_ids,
            other => return Err(HandlerError::UnexpectedPacket(other.ns().to_string())),
        };

        if !group_ids.is_empty() {
            self.groups.unsub_groups(session, &group_ids).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::session::{IndexWriter, SessionId, SessionRegistry};

    #[tokio::test]
    async fn test_subscribe_then_unsubscribe() {
        let writer = IndexWriter::spawn(8);
        let registry = SessionRegistry::new(writer.clone());
        let groups = GroupSubscriptionIndex::new(writer);
        let (session, _rx) = Session::open(SessionId::new(1), Identity::User { uid: 1 }, 4);
        registry.add(&session).await.unwrap();

        GroupSubscribeHandler::new(groups.clone())
            .handle(&session, Packet::GroupSubscribe { group_ids: vec![1, 2] })
            .await
            .unwrap();
        assert_eq!(session.subscribed_groups(), vec![1, 2]);

        GroupUnsubscribeHandler::new(groups.clone())
            .handle(&session, Packet::GroupUnsubscribe { group_ids: vec![1] })
            .await
            .unwrap();
        assert_eq!(session.subscribed_groups(), vec![2]);
        assert!(groups.find_by_group_id(1).is_empty());
    }

    #[tokio::test]
    async fn test_wrong_packet_rejected() {
        let groups = GroupSubscriptionIndex::new(IndexWriter::spawn(8));
        let (session, _rx) = Session::open(SessionId::new(1), Identity::Anonymous, 4);

        let result = GroupSubscribeHandler::new(groups)
            .handle(&session, Packet::Ping)
            .await;
        assert!(matches!(result, Err(HandlerError::UnexpectedPacket(ns)) if ns == "ping"));
    }
}
