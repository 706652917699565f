use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::namespace;
use super::types::{GroupId, Packet};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("packet must be a JSON object")]
    NotAnObject,

    #[error("packet has no @ns field")]
    MissingNamespace,

    #[error("@ns must be a string")]
    InvalidNamespace,
}

#[derive(Deserialize)]
struct GroupIdsBody {
    #[serde(rename = "groupIds", default)]
    group_ids: Vec<GroupId>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

impl Packet {
    /// Decode a text frame. The namespace is read first, then the body is
    /// parsed as the variant it names. Unrecognized namespaces yield
    /// [`Packet::Unknown`] rather than an error.
    pub fn decode(text: &str) -> Result<Packet, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn decode_slice(bytes: &[u8]) -> Result<Packet, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Packet, DecodeError> {
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let ns = match object.get(namespace::NS_FIELD) {
            Some(Value::String(ns)) => ns.clone(),
            Some(_) => return Err(DecodeError::InvalidNamespace),
            None => return Err(DecodeError::MissingNamespace),
        };

        let packet = match ns.as_str() {
            namespace::PING => Packet::Ping,
            namespace::PONG => Packet::Pong,
            namespace::PRIVATE_MESSAGE => Packet::PrivateMessage(serde_json::from_value(value)?),
            namespace::GROUP_MESSAGE => Packet::GroupMessage(serde_json::from_value(value)?),
            namespace::GROUP_SUBSCRIBE => {
                let body: GroupIdsBody = serde_json::from_value(value)?;
                Packet::GroupSubscribe {
                    group_ids: body.group_ids,
                }
            }
            namespace::GROUP_UNSUBSCRIBE => {
                let body: GroupIdsBody = serde_json::from_value(value)?;
                Packet::GroupUnsubscribe {
                    group_ids: body.group_ids,
                }
            }
            namespace::ERROR => {
                let body: ErrorBody = serde_json::from_value(value)?;
                Packet::Error {
                    title: body.title,
                    detail: body.detail,
                }
            }
            _ => Packet::Unknown { ns },
        };

        Ok(packet)
    }
}

/// Nested packets (e.g. inside cluster envelopes) decode the same way as frames.
impl<'de> Deserialize<'de> for Packet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Packet::from_value(value).map_err(serde::de::Error::custom)
    }
}
