use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::auth::{Identity, Uid};
use crate::packet::{GroupId, Packet};
use crate::websocket::OutboundMessage;

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Liveness of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Open,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("session {0} is not open")]
    NotOpen(SessionId),

    #[error("outbound queue of session {0} is gone")]
    Disconnected(SessionId),

    #[error("outbound queue of session {0} is full")]
    Full(SessionId),
}

/// One live connection: identity, outbound queue, liveness and subscriptions.
pub struct Session {
    id: SessionId,
    identity: Identity,
    outbound: mpsc::Sender<OutboundMessage>,
    state: AtomicU8,
    close_tx: watch::Sender<bool>,
    /// Written only by the index writer
    subscribed_groups: DashSet<GroupId>,
    connected_at: DateTime<Utc>,
    last_activity: AtomicI64,
}

impl Session {
    pub fn new(id: SessionId, identity: Identity, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        let (close_tx, _) = watch::channel(false);
        Self {
            id,
            identity,
            outbound,
            state: AtomicU8::new(SessionState::Open as u8),
            close_tx,
            subscribed_groups: DashSet::new(),
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Create a session together with the receiving end of its outbound queue.
    pub fn open(
        id: SessionId,
        identity: Identity,
        buffer: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Arc::new(Self::new(id, identity, tx)), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn uid(&self) -> Option<Uid> {
        self.identity.uid()
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_anonymous()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub async fn send(&self, packet: Packet) -> Result<(), SendError> {
        self.enqueue(OutboundMessage::Packet(packet)).await
    }

    /// Enqueue an already serialized packet; used by fan-out.
    pub async fn send_serialized(&self, text: Arc<str>) -> Result<(), SendError> {
        self.enqueue(OutboundMessage::Serialized(text)).await
    }

    /// Enqueue without waiting for queue space. A full queue is reported as
    /// [`SendError::Full`] and the packet is dropped for this session only.
    pub fn try_send_serialized(&self, text: Arc<str>) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen(self.id));
        }
        self.outbound
            .try_send(OutboundMessage::Serialized(text))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::Full(self.id),
                mpsc::error::TrySendError::Closed(_) => SendError::Disconnected(self.id),
            })
    }

    async fn enqueue(&self, message: OutboundMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen(self.id));
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| SendError::Disconnected(self.id))
    }

    /// Request the connection to close. Returns `true` only for the call that
    /// moved the session out of `Open`.
    pub fn close(&self) -> bool {
        let moved = self
            .state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            self.close_tx.send_replace(true);
        }
        moved
    }

    /// Terminal transition, performed by the connection once deregistered.
    pub fn mark_closed(&self) -> bool {
        let previous = self
            .state
            .swap(SessionState::Closed as u8, Ordering::AcqRel);
        self.close_tx.send_replace(true);
        previous != SessionState::Closed as u8
    }

    /// Resolves once [`Session::close`] or [`Session::mark_closed`] ran.
    pub async fn closed(&self) {
        let mut rx = self.close_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn subscribed_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.subscribed_groups.iter().map(|g| *g).collect();
        groups.sort_unstable();
        groups
    }

    pub fn is_subscribed(&self, group_id: GroupId) -> bool {
        self.subscribed_groups.contains(&group_id)
    }

    pub(crate) fn attach_group(&self, group_id: GroupId) {
        self.subscribed_groups.insert(group_id);
    }

    pub(crate) fn detach_group(&self, group_id: GroupId) {
        self.subscribed_groups.remove(&group_id);
    }

    pub(crate) fn take_groups(&self) -> Vec<GroupId> {
        let groups: Vec<GroupId> = self.subscribed_groups.iter().map(|g| *g).collect();
        for group_id in &groups {
            self.subscribed_groups.remove(group_id);
        }
        groups
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_session(id: u64, uid: Uid) -> (Arc<Session>, mpsc::Receiver<OutboundMessage>) {
        Session::open(SessionId::new(id), Identity::User { uid }, 8)
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(255).to_string(), "00000000000000ff");
    }

    #[tokio::test]
    async fn test_send_while_open() {
        let (session, mut rx) = user_session(1, 10);
        session.send(Packet::Pong).await.unwrap();

        match rx.recv().await {
            Some(OutboundMessage::Packet(Packet::Pong)) => {}
            other => panic!("unexpected outbound message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_after_close_rejected() {
        let (session, _rx) = user_session(1, 10);
        assert!(session.close());
        assert!(matches!(
            session.send(Packet::Pong).await,
            Err(SendError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (session, rx) = user_session(1, 10);
        drop(rx);
        assert!(matches!(
            session.send(Packet::Pong).await,
            Err(SendError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let (session, mut rx) = Session::open(SessionId::new(1), Identity::User { uid: 10 }, 1);

        session.try_send_serialized(Arc::from("{}")).unwrap();
        assert!(matches!(
            session.try_send_serialized(Arc::from("{}")),
            Err(SendError::Full(_))
        ));

        assert!(matches!(rx.recv().await, Some(OutboundMessage::Serialized(_))));
        assert!(session.try_send_serialized(Arc::from("{}")).is_ok());
    }

    #[test]
    fn test_state_transitions_happen_once() {
        let (session, _rx) = user_session(1, 10);
        assert_eq!(session.state(), SessionState::Open);

        assert!(session.close());
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Closing);

        assert!(session.mark_closed());
        assert!(!session.mark_closed());
        assert!(!session.close());
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (session, _rx) = user_session(1, 10);
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.closed().await })
        };

        session.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();

        // Already closed: resolves immediately
        session.closed().await;
    }

    #[test]
    fn test_closed_pending_until_close() {
        use tokio_test::{assert_pending, assert_ready, task};

        let (session, _rx) = user_session(1, 10);
        let mut closed = task::spawn(session.closed());
        assert_pending!(closed.poll());

        session.close();
        assert!(closed.is_woken());
        assert_ready!(closed.poll());
    }

    #[test]
    fn test_group_bookkeeping() {
        let (session, _rx) = user_session(1, 10);
        session.attach_group(3);
        session.attach_group(1);
        assert_eq!(session.subscribed_groups(), vec![1, 3]);
        assert!(session.is_subscribed(3));

        session.detach_group(3);
        assert!(!session.is_subscribed(3));

        assert_eq!(session.take_groups(), vec![1]);
        assert!(session.subscribed_groups().is_empty());
    }

    #[test]
    fn test_anonymous_identity() {
        let (session, _rx) = Session::open(SessionId::new(9), Identity::Anonymous, 1);
        assert!(session.is_anonymous());
        assert_eq!(session.uid(), None);
    }
}
