//! Registry, group index and dispatcher wired together through `AppState`,
//! without a socket in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ara_messaging_service::auth::Identity;
use ara_messaging_service::config::{AuthConfig, Settings};
use ara_messaging_service::dispatcher::DispatchOutcome;
use ara_messaging_service::packet::{MessagePacket, Packet};
use ara_messaging_service::server::{AppState, Components};
use ara_messaging_service::session::{Session, SessionId, StaticGroupMembership};
use ara_messaging_service::websocket::OutboundMessage;

fn test_settings() -> Settings {
    Settings {
        server: Default::default(),
        auth: AuthConfig {
            jwt_secret: "components-secret".to_string(),
            issuer: None,
            audience: None,
            leeway_seconds: 0,
            allow_anonymous: true,
        },
        session: Default::default(),
        message: Default::default(),
        cluster: Default::default(),
        logging: Default::default(),
    }
}

async fn test_state() -> AppState {
    let settings = test_settings();
    let components = Components::from_settings(&settings);
    AppState::with_components(settings, components).await.unwrap()
}

async fn connect(
    state: &AppState,
    id: u64,
    identity: Identity,
) -> (Arc<Session>, mpsc::Receiver<OutboundMessage>) {
    let (session, rx) = Session::open(SessionId::new(id), identity, 16);
    state.registry.add(&session).await.unwrap();
    (session, rx)
}

fn message(to: i64, content: &str) -> MessagePacket {
    MessagePacket {
        message_id: None,
        from: None,
        to,
        content: content.to_string(),
        content_type: 1,
        extra_args: None,
    }
}

async fn next_packet(rx: &mut mpsc::Receiver<OutboundMessage>) -> Packet {
    let item = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a packet")
        .expect("outbound queue closed");

    match item {
        OutboundMessage::Packet(packet) => packet,
        OutboundMessage::Serialized(text) => Packet::decode(&text).unwrap(),
        OutboundMessage::Close { code, .. } => panic!("unexpected close {}", code),
    }
}

#[tokio::test]
async fn test_private_message_reaches_every_session_of_uid() {
    let state = test_state().await;
    let (sender, mut sender_rx) = connect(&state, 1, Identity::User { uid: 1 }).await;
    let (_phone, mut phone_rx) = connect(&state, 2, Identity::User { uid: 2 }).await;
    let (_laptop, mut laptop_rx) = connect(&state, 3, Identity::User { uid: 2 }).await;

    let outcome = state
        .dispatcher
        .dispatch(&sender, Packet::PrivateMessage(message(2, "hello")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    for rx in [&mut phone_rx, &mut laptop_rx] {
        match next_packet(rx).await {
            Packet::PrivateMessage(received) => {
                assert_eq!(received.from, Some(1));
                assert_eq!(received.to, 2);
                assert_eq!(received.content, "hello");
                assert!(received.message_id.is_some());
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }
    assert!(sender_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_private_message_to_offline_user_is_handled() {
    let state = test_state().await;
    let (sender, mut sender_rx) = connect(&state, 1, Identity::User { uid: 1 }).await;

    let outcome = state
        .dispatcher
        .dispatch(&sender, Packet::PrivateMessage(message(99, "anyone?")))
        .await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert!(sender_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_group_fan_out_includes_subscribed_sender() {
    let state = test_state().await;
    let (alice, mut alice_rx) = connect(&state, 1, Identity::User { uid: 1 }).await;
    let (bob, mut bob_rx) = connect(&state, 2, Identity::User { uid: 2 }).await;
    let (_carol, mut carol_rx) = connect(&state, 3, Identity::User { uid: 3 }).await;

    for session in [&alice, &bob] {
        let outcome = state
            .dispatcher
            .dispatch(session, Packet::GroupSubscribe { group_ids: vec![42] })
            .await;
        assert_eq!(outcome, DispatchOutcome::Handled);
    }
    assert_eq!(state.groups.subscriber_count(42), 2);

    let outcome = state
        .dispatcher
        .dispatch(&alice, Packet::GroupMessage(message(42, "team")))
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    for rx in [&mut alice_rx, &mut bob_rx] {
        match next_packet(rx).await {
            Packet::GroupMessage(received) => {
                assert_eq!(received.from, Some(1));
                assert_eq!(received.to, 42);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }
    assert!(carol_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_validation_failure_keeps_session_open() {
    let state = test_state().await;
    let (sender, mut rx) = connect(&state, 1, Identity::User { uid: 1 }).await;

    let outcome = state
        .dispatcher
        .dispatch(&sender, Packet::PrivateMessage(message(2, "")))
        .await;

    assert_eq!(outcome, DispatchOutcome::Rejected);
    assert!(matches!(next_packet(&mut rx).await, Packet::Error { .. }));
    assert!(sender.is_open());
}

#[tokio::test]
async fn test_forged_from_is_rejected() {
    let state = test_state().await;
    let (sender, mut sender_rx) = connect(&state, 1, Identity::User { uid: 1 }).await;
    let (_target, mut target_rx) = connect(&state, 2, Identity::User { uid: 2 }).await;

    let mut forged = message(2, "hi");
    forged.from = Some(5);
    let outcome = state
        .dispatcher
        .dispatch(&sender, Packet::PrivateMessage(forged))
        .await;

    assert_eq!(outcome, DispatchOutcome::Rejected);
    assert!(matches!(next_packet(&mut sender_rx).await, Packet::Error { .. }));
    assert!(target_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_namespace_reports_error() {
    let state = test_state().await;
    let (session, mut rx) = connect(&state, 1, Identity::Anonymous).await;

    let packet = Packet::decode(r#"{"@ns":"x.custom","payload":1}"#).unwrap();
    let outcome = state.dispatcher.dispatch(&session, packet).await;

    assert_eq!(outcome, DispatchOutcome::UnknownNamespace);
    match next_packet(&mut rx).await {
        Packet::Error { title, .. } => assert_eq!(title, "unknown namespace"),
        other => panic!("unexpected packet {:?}", other),
    }
}

#[tokio::test]
async fn test_dispatch_to_closing_session_is_ignored() {
    let state = test_state().await;
    let (session, mut rx) = connect(&state, 1, Identity::User { uid: 1 }).await;
    session.close();

    let outcome = state.dispatcher.dispatch(&session, Packet::Ping).await;

    assert_eq!(outcome, DispatchOutcome::Ignored);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_ping_after_deregistration_closes_session() {
    let state = test_state().await;
    let (session, mut rx) = connect(&state, 1, Identity::User { uid: 1 }).await;

    assert!(state.registry.remove(&session).await.unwrap());
    let outcome = state.dispatcher.dispatch(&session, Packet::Ping).await;

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert!(!session.is_open());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_removal_purges_group_subscriptions() {
    let state = test_state().await;
    let (session, _rx) = connect(&state, 1, Identity::User { uid: 1 }).await;
    state.groups.sub_groups(&session, &[1, 2, 3]).await.unwrap();
    assert_eq!(state.groups.group_count(), 3);

    state.registry.remove(&session).await.unwrap();

    assert_eq!(state.groups.group_count(), 0);
    assert!(session.subscribed_groups().is_empty());
    assert!(state.registry.find_by_uid(1).is_empty());
}

#[tokio::test]
async fn test_remove_by_uid_drops_all_sessions_of_user() {
    let state = test_state().await;
    let (_a, _rx_a) = connect(&state, 1, Identity::User { uid: 7 }).await;
    let (_b, _rx_b) = connect(&state, 2, Identity::User { uid: 7 }).await;
    let (_other, _rx_other) = connect(&state, 3, Identity::User { uid: 8 }).await;

    let removed = state.registry.remove_by_uid(7).await.unwrap();

    assert_eq!(removed.len(), 2);
    assert!(state.registry.find_by_uid(7).is_empty());
    assert_eq!(state.registry.len(), 1);
    assert_eq!(state.registry.user_count(), 1);
}

#[tokio::test]
async fn test_concurrent_churn_keeps_indices_coherent() {
    let state = test_state().await;

    let mut tasks = Vec::new();
    for id in 0..64u64 {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let uid = (id % 8) as i64;
            let (session, _rx) = Session::open(SessionId::new(id), Identity::User { uid }, 4);
            state.registry.add(&session).await.unwrap();
            state.groups.sub_groups(&session, &[100, 200]).await.unwrap();
            if id % 2 == 0 {
                state.registry.remove(&session).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let remaining = state.registry.all();
    assert_eq!(remaining.len(), 32);
    assert_eq!(state.groups.subscriber_count(100), 32);
    assert_eq!(state.groups.subscriber_count(200), 32);

    for session in &remaining {
        let uid = session.uid().unwrap();
        assert!(state
            .registry
            .find_by_uid(uid)
            .iter()
            .any(|s| Arc::ptr_eq(s, session)));
        assert_eq!(session.subscribed_groups(), vec![100, 200]);
    }
    for subscriber in state.groups.find_by_group_id(100) {
        assert!(state.registry.contains(&subscriber));
    }
}

#[tokio::test]
async fn test_membership_subscribes_new_user_sessions() {
    let settings = test_settings();
    let membership = Arc::new(StaticGroupMembership::new());
    membership.set(3, vec![10, 11]);

    let mut components = Components::from_settings(&settings);
    components.membership = Some(membership);
    let state = AppState::with_components(settings, components).await.unwrap();

    let (session, _rx) = connect(&state, 1, Identity::User { uid: 3 }).await;

    // Listeners run after the add committed
    let mut attempts = 0;
    while session.subscribed_groups() != vec![10, 11] {
        attempts += 1;
        assert!(attempts < 100, "auto subscription did not happen");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.groups.subscriber_count(10), 1);
}
