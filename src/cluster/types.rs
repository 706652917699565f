//! Cluster envelope and error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Uid;
use crate::packet::{GroupId, Packet};

/// Recipient of a routed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RouteTarget {
    User(Uid),
    Group(GroupId),
}

/// Packet forwarded to other instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedPacket {
    /// Server id of the publishing instance
    pub from_server: String,
    pub target: RouteTarget,
    pub packet: Packet,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("subscription stream ended")]
    StreamEnded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MessagePacket;
    use serde_json::json;

    #[test]
    fn test_routed_packet_wire_format() {
        let routed = RoutedPacket {
            from_server: "node-a".to_string(),
            target: RouteTarget::Group(9),
            packet: Packet::GroupMessage(MessagePacket {
                message_id: Some("m1".to_string()),
                from: Some(1),
                to: 9,
                content: "hello".to_string(),
                content_type: 1,
                extra_args: None,
            }),
        };

        let value = serde_json::to_value(&routed).unwrap();
        assert_eq!(value["fromServer"], "node-a");
        assert_eq!(value["target"], json!({"kind": "group", "id": 9}));
        assert_eq!(value["packet"]["@ns"], "g.message");

        let parsed: RoutedPacket = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, routed);
    }
}
