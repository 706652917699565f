use std::sync::Arc;

use smallvec::SmallVec;
use thiserror::Error;

use crate::auth::Uid;

use super::listener::ListenerSet;
use super::writer::IndexError;
use super::{IndexStats, IndexWriter, Session, SessionEvent, SessionId, SessionListener};

/// Most users hold a handful of concurrent sessions.
pub type UidSessions = SmallVec<[Arc<Session>; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The same instance was already registered; nothing changed.
    AlreadyRegistered,
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("session id {0} is held by another session")]
    Conflict(SessionId),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Authoritative index of live sessions by id and by uid.
#[derive(Clone)]
pub struct SessionRegistry {
    writer: IndexWriter,
    listeners: Arc<ListenerSet<dyn SessionListener>>,
}

impl SessionRegistry {
    pub fn new(writer: IndexWriter) -> Self {
        Self {
            writer,
            listeners: Arc::new(ListenerSet::default()),
        }
    }

    pub async fn register_listener(&self, listener: Arc<dyn SessionListener>) {
        tracing::debug!(listener = listener.name(), "Session listener registered");
        self.listeners.push(listener).await;
    }

    pub async fn add(&self, session: &Arc<Session>) -> Result<AddOutcome, RegistryError> {
        self.listeners.notify(SessionEvent::BeforeAdd, session).await;

        let outcome = self.writer.add(session.clone()).await?;

        if outcome == AddOutcome::Added {
            tracing::info!(
                session_id = %session.id(),
                identity = %session.identity(),
                "Session registered"
            );
            self.listeners
                .notify(SessionEvent::AfterAdd(self.stats()), session)
                .await;
        }

        Ok(outcome)
    }

    /// Remove this exact instance. Returns `false` when it was not registered.
    ///
    /// Membership is checked before the writer runs, so concurrent removals
    /// of the same instance may each emit `BeforeRemove`. Only the one that
    /// removed it emits `AfterRemove` and returns `true`.
    pub async fn remove(&self, session: &Arc<Session>) -> Result<bool, IndexError> {
        if !self.contains(session) {
            return Ok(false);
        }

        self.listeners
            .notify(SessionEvent::BeforeRemove, session)
            .await;

        let removed = self.writer.remove(session.clone()).await?;
        if removed {
            self.after_remove(session).await;
        }

        Ok(removed)
    }

    pub async fn remove_by_id(&self, id: SessionId) -> Result<Option<Arc<Session>>, IndexError> {
        if let Some(session) = self.find_by_id(id) {
            self.listeners
                .notify(SessionEvent::BeforeRemove, &session)
                .await;
        }

        let removed = self.writer.remove_by_id(id).await?;
        if let Some(ref session) = removed {
            self.after_remove(session).await;
        }

        Ok(removed)
    }

    /// Remove every session of a user in one writer step.
    pub async fn remove_by_uid(&self, uid: Uid) -> Result<Vec<Arc<Session>>, IndexError> {
        for session in self.find_by_uid(uid) {
            self.listeners
                .notify(SessionEvent::BeforeRemove, &session)
                .await;
        }

        let removed = self.writer.remove_by_uid(uid).await?;
        for session in &removed {
            self.after_remove(session).await;
        }

        Ok(removed)
    }

    async fn after_remove(&self, session: &Arc<Session>) {
        tracing::info!(
            session_id = %session.id(),
            identity = %session.identity(),
            "Session unregistered"
        );
        self.listeners
            .notify(SessionEvent::AfterRemove(self.stats()), session)
            .await;
    }

    pub fn find_by_id(&self, id: SessionId) -> Option<Arc<Session>> {
        self.writer
            .state()
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
    }

    pub fn find_by_uid(&self, uid: Uid) -> UidSessions {
        self.writer
            .state()
            .uid_sessions
            .get(&uid)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Arc<Session>> {
        self.writer
            .state()
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn contains(&self, session: &Arc<Session>) -> bool {
        self.writer.state().contains(session)
    }

    pub fn len(&self) -> usize {
        self.writer.state().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct uids with at least one live session
    pub fn user_count(&self) -> usize {
        self.writer.state().uid_sessions.len()
    }

    pub fn stats(&self) -> IndexStats {
        self.writer.state().stats()
    }
}
