use serde::{Deserialize, Serialize};

use crate::auth::Uid;

use super::namespace;

/// Numeric group id
pub type GroupId = i64;

/// Payload shared by private and group messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Uid>,
    /// Receiving uid for private messages, group id for group messages
    pub to: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_args: Option<String>,
}

/// A single protocol envelope, discriminated by `@ns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "@ns")]
pub enum Packet {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "p.message")]
    PrivateMessage(MessagePacket),
    #[serde(rename = "g.message")]
    GroupMessage(MessagePacket),
    #[serde(rename = "g.subscribe")]
    GroupSubscribe {
        #[serde(rename = "groupIds")]
        group_ids: Vec<GroupId>,
    },
    #[serde(rename = "g.unsubscribe")]
    GroupUnsubscribe {
        #[serde(rename = "groupIds")]
        group_ids: Vec<GroupId>,
    },
    #[serde(rename = "error")]
    Error { title: String, detail: String },
    /// Decoded envelope whose namespace names no known variant
    #[serde(skip)]
    Unknown { ns: String },
}

impl Packet {
    pub fn ns(&self) -> &str {
        match self {
            Packet::Ping => namespace::PING,
            Packet::Pong => namespace::PONG,
            Packet::PrivateMessage(_) => namespace::PRIVATE_MESSAGE,
            Packet::GroupMessage(_) => namespace::GROUP_MESSAGE,
            Packet::GroupSubscribe { .. } => namespace::GROUP_SUBSCRIBE,
            Packet::GroupUnsubscribe { .. } => namespace::GROUP_UNSUBSCRIBE,
            Packet::Error { .. } => namespace::ERROR,
            Packet::Unknown { ns } => ns,
        }
    }

    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Error {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Recognized `contentType` codes of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text = 1,
    Image = 2,
    Audio = 3,
    Video = 4,
    File = 5,
    Location = 6,
    Custom = 7,
}

impl ContentType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Text),
            2 => Some(Self::Image),
            3 => Some(Self::Audio),
            4 => Some(Self::Video),
            5 => Some(Self::File),
            6 => Some(Self::Location),
            7 => Some(Self::Custom),
            _ => None,
        }
    }
}
