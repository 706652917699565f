use uuid::Uuid;

use crate::config::MessageConfig;
use crate::dispatcher::HandlerError;
use crate::packet::{ContentType, MessagePacket};
use crate::session::Session;

const MAX_MESSAGE_ID_LEN: usize = 64;

/// Fill server-owned fields of an inbound message and validate the rest.
pub(super) fn prepare_message(
    session: &Session,
    message: &mut MessagePacket,
    config: &MessageConfig,
) -> Result<(), HandlerError> {
    if config.autofill_id && message.message_id.as_deref().map_or(true, str::is_empty) {
        message.message_id = Some(Uuid::new_v4().simple().to_string());
    }

    check_message_id(message.message_id.as_deref())?;

    if message.content.is_empty() {
        return Err(HandlerError::Validation(
            "content must not be empty".to_string(),
        ));
    }

    if ContentType::from_code(message.content_type).is_none() {
        return Err(HandlerError::Validation(format!(
            "unknown contentType {}",
            message.content_type
        )));
    }

    match (message.from, session.uid()) {
        (Some(from), Some(uid)) if from != uid => Err(HandlerError::Forbidden(format!(
            "from {} does not match the sender",
            from
        ))),
        (Some(_), None) => Err(HandlerError::Forbidden(
            "anonymous sessions cannot set from".to_string(),
        )),
        (_, uid) => {
            message.from = uid;
            Ok(())
        }
    }
}

fn check_message_id(message_id: Option<&str>) -> Result<(), HandlerError> {
    let Some(message_id) = message_id else {
        return Err(HandlerError::Validation("messageId is required".to_string()));
    };

    let len = message_id.chars().count();
    if len == 0 || len > MAX_MESSAGE_ID_LEN {
        return Err(HandlerError::Validation(format!(
            "messageId must be 1 to {} characters",
            MAX_MESSAGE_ID_LEN
        )));
    }

    if message_id.chars().any(char::is_whitespace) {
        return Err(HandlerError::Validation(
            "messageId must not contain whitespace".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::session::SessionId;
    use std::sync::Arc;

    fn message() -> MessagePacket {
        MessagePacket {
            message_id: Some("m-1".to_string()),
            from: None,
            to: 2,
            content: "hello".to_string(),
            content_type: 1,
            extra_args: None,
        }
    }

    fn sender(identity: Identity) -> Arc<Session> {
        Session::open(SessionId::new(1), identity, 1).0
    }

    fn autofill(enabled: bool) -> MessageConfig {
        MessageConfig {
            autofill_id: enabled,
        }
    }

    #[test]
    fn test_fills_from_with_sender_uid() {
        let mut msg = message();
        prepare_message(&sender(Identity::User { uid: 7 }), &mut msg, &autofill(true)).unwrap();
        assert_eq!(msg.from, Some(7));
        assert_eq!(msg.message_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn test_autofills_message_id() {
        let mut msg = MessagePacket {
            message_id: None,
            ..message()
        };
        prepare_message(&sender(Identity::User { uid: 7 }), &mut msg, &autofill(true)).unwrap();
        assert_eq!(msg.message_id.map(|id| id.len()), Some(32));

        let mut msg = MessagePacket {
            message_id: Some(String::new()),
            ..message()
        };
        prepare_message(&sender(Identity::User { uid: 7 }), &mut msg, &autofill(true)).unwrap();
        assert!(msg.message_id.is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn test_missing_id_without_autofill() {
        let mut msg = MessagePacket {
            message_id: None,
            ..message()
        };
        let result = prepare_message(&sender(Identity::User { uid: 7 }), &mut msg, &autofill(false));
        assert!(matches!(result, Err(HandlerError::Validation(_))));
    }

    #[test]
    fn test_message_id_rules() {
        assert!(check_message_id(Some(&"x".repeat(64))).is_ok());
        assert!(check_message_id(Some(&"x".repeat(65))).is_err());
        assert!(check_message_id(Some("has space")).is_err());
        assert!(check_message_id(Some("")).is_err());
    }

    #[test]
    fn test_content_rules() {
        let user = sender(Identity::User { uid: 7 });

        let mut empty = MessagePacket {
            content: String::new(),
            ..message()
        };
        assert!(prepare_message(&user, &mut empty, &autofill(true)).is_err());

        let mut bad_type = MessagePacket {
            content_type: 42,
            ..message()
        };
        assert!(matches!(
            prepare_message(&user, &mut bad_type, &autofill(true)),
            Err(HandlerError::Validation(detail)) if detail.contains("42")
        ));
    }

    #[test]
    fn test_from_must_match_sender() {
        let mut spoofed = MessagePacket {
            from: Some(99),
            ..message()
        };
        assert!(matches!(
            prepare_message(&sender(Identity::User { uid: 7 }), &mut spoofed, &autofill(true)),
            Err(HandlerError::Forbidden(_))
        ));

        let mut honest = MessagePacket {
            from: Some(7),
            ..message()
        };
        assert!(prepare_message(&sender(Identity::User { uid: 7 }), &mut honest, &autofill(true)).is_ok());
    }

    #[test]
    fn test_anonymous_sender() {
        let anonymous = sender(Identity::Anonymous);

        let mut msg = message();
        prepare_message(&anonymous, &mut msg, &autofill(true)).unwrap();
        assert_eq!(msg.from, None);

        let mut claimed = MessagePacket {
            from: Some(1),
            ..message()
        };
        assert!(matches!(
            prepare_message(&anonymous, &mut claimed, &autofill(true)),
            Err(HandlerError::Forbidden(_))
        ));
    }
}
