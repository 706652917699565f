use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::auth::Uid;
use crate::packet::GroupId;

use super::{AddOutcome, IndexStats, RegistryError, Session, SessionId};

pub(crate) type SessionSet = HashMap<SessionId, Arc<Session>>;

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("index writer is not running")]
    WriterStopped,
}

/// Shared indices. Readers go straight to the maps; only the writer task
/// mutates them.
#[derive(Default)]
pub(crate) struct IndexState {
    pub(crate) sessions: DashMap<SessionId, Arc<Session>>,
    pub(crate) uid_sessions: DashMap<Uid, SessionSet>,
    pub(crate) groups: DashMap<GroupId, SessionSet>,
}

enum Mutation {
    Add {
        session: Arc<Session>,
        reply: oneshot::Sender<Result<AddOutcome, RegistryError>>,
    },
    Remove {
        session: Arc<Session>,
        reply: oneshot::Sender<bool>,
    },
    RemoveById {
        id: SessionId,
        reply: oneshot::Sender<Option<Arc<Session>>>,
    },
    RemoveByUid {
        uid: Uid,
        reply: oneshot::Sender<Vec<Arc<Session>>>,
    },
    Subscribe {
        session: Arc<Session>,
        group_id: GroupId,
        reply: oneshot::Sender<bool>,
    },
    Unsubscribe {
        session: Arc<Session>,
        group_id: GroupId,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the single task that applies every registry and group mutation
/// in one total order.
#[derive(Clone)]
pub struct IndexWriter {
    state: Arc<IndexState>,
    tx: mpsc::Sender<Mutation>,
}

impl IndexWriter {
    /// Spawn the writer task. It stops once every handle is dropped.
    pub fn spawn(capacity: usize) -> Self {
        let state = Arc::new(IndexState::default());
        let (tx, rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(run(state.clone(), rx));

        Self { state, tx }
    }

    pub(crate) fn state(&self) -> &IndexState {
        &self.state
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Mutation,
    ) -> Result<T, IndexError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| IndexError::WriterStopped)?;
        rx.await.map_err(|_| IndexError::WriterStopped)
    }

    pub(crate) async fn add(&self, session: Arc<Session>) -> Result<AddOutcome, RegistryError> {
        self.request(|reply| Mutation::Add { session, reply }).await?
    }

    pub(crate) async fn remove(&self, session: Arc<Session>) -> Result<bool, IndexError> {
        self.request(|reply| Mutation::Remove { session, reply })
            .await
    }

    pub(crate) async fn remove_by_id(
        &self,
        id: SessionId,
    ) -> Result<Option<Arc<Session>>, IndexError> {
        self.request(|reply| Mutation::RemoveById { id, reply }).await
    }

    pub(crate) async fn remove_by_uid(&self, uid: Uid) -> Result<Vec<Arc<Session>>, IndexError> {
        self.request(|reply| Mutation::RemoveByUid { uid, reply })
            .await
    }

    pub(crate) async fn subscribe(
        &self,
        session: Arc<Session>,
        group_id: GroupId,
    ) -> Result<bool, IndexError> {
        self.request(|reply| Mutation::Subscribe {
            session,
            group_id,
            reply,
        })
        .await
    }

    pub(crate) async fn unsubscribe(
        &self,
        session: Arc<Session>,
        group_id: GroupId,
    ) -> Result<bool, IndexError> {
        self.request(|reply| Mutation::Unsubscribe {
            session,
            group_id,
            reply,
        })
        .await
    }
}

async fn run(state: Arc<IndexState>, mut rx: mpsc::Receiver<Mutation>) {
    tracing::debug!("Index writer started");

    while let Some(mutation) = rx.recv().await {
        state.apply(mutation);
    }

    tracing::debug!("Index writer stopped");
}

impl IndexState {
    // Synchronous on purpose: no map guard may live across an await.
    fn apply(&self, mutation: Mutation) {
        // A dropped reply receiver means the caller gave up; the mutation
        // still stands.
        match mutation {
            Mutation::Add { session, reply } => {
                let _ = reply.send(self.insert(session));
            }
            Mutation::Remove { session, reply } => {
                let _ = reply.send(self.remove(&session));
            }
            Mutation::RemoveById { id, reply } => {
                let removed = self.sessions.remove(&id).map(|(_, session)| {
                    self.detach(&session);
                    session
                });
                let _ = reply.send(removed);
            }
            Mutation::RemoveByUid { uid, reply } => {
                let _ = reply.send(self.remove_uid(uid));
            }
            Mutation::Subscribe {
                session,
                group_id,
                reply,
            } => {
                let _ = reply.send(self.subscribe(&session, group_id));
            }
            Mutation::Unsubscribe {
                session,
                group_id,
                reply,
            } => {
                let _ = reply.send(self.unsubscribe(&session, group_id));
            }
        }
    }

    fn insert(&self, session: Arc<Session>) -> Result<AddOutcome, RegistryError> {
        let id = session.id();
        match self.sessions.entry(id) {
            Entry::Occupied(existing) => {
                if Arc::ptr_eq(existing.get(), &session) {
                    Ok(AddOutcome::AlreadyRegistered)
                } else {
                    Err(RegistryError::Conflict(id))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                if let Some(uid) = session.uid() {
                    self.uid_sessions.entry(uid).or_default().insert(id, session);
                }
                Ok(AddOutcome::Added)
            }
        }
    }

    fn remove(&self, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(&session.id(), |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            self.detach(session);
        }
        removed
    }

    fn remove_uid(&self, uid: Uid) -> Vec<Arc<Session>> {
        let Some((_, sessions)) = self.uid_sessions.remove(&uid) else {
            return Vec::new();
        };

        sessions
            .into_values()
            .filter(|session| {
                let removed = self
                    .sessions
                    .remove_if(&session.id(), |_, current| Arc::ptr_eq(current, session))
                    .is_some();
                self.purge_groups(session);
                removed
            })
            .collect()
    }

    /// Drop every secondary entry of a session already gone from the primary index.
    fn detach(&self, session: &Arc<Session>) {
        if let Some(uid) = session.uid() {
            if let Some(mut sessions) = self.uid_sessions.get_mut(&uid) {
                if sessions
                    .get(&session.id())
                    .is_some_and(|current| Arc::ptr_eq(current, session))
                {
                    sessions.remove(&session.id());
                }
            }
            self.uid_sessions.remove_if(&uid, |_, sessions| sessions.is_empty());
        }
        self.purge_groups(session);
    }

    fn purge_groups(&self, session: &Arc<Session>) {
        for group_id in session.take_groups() {
            self.detach_group(group_id, session);
        }
    }

    fn detach_group(&self, group_id: GroupId, session: &Arc<Session>) -> bool {
        let mut removed = false;
        if let Some(mut members) = self.groups.get_mut(&group_id) {
            if members
                .get(&session.id())
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                members.remove(&session.id());
                removed = true;
            }
        }
        self.groups.remove_if(&group_id, |_, members| members.is_empty());
        removed
    }

    fn subscribe(&self, session: &Arc<Session>, group_id: GroupId) -> bool {
        if !session.is_open() || !self.contains(session) {
            return false;
        }

        let mut members = self.groups.entry(group_id).or_default();
        if members.contains_key(&session.id()) {
            return false;
        }
        members.insert(session.id(), session.clone());
        drop(members);

        session.attach_group(group_id);
        true
    }

    fn unsubscribe(&self, session: &Arc<Session>, group_id: GroupId) -> bool {
        let removed = self.detach_group(group_id, session);
        session.detach_group(group_id);
        removed
    }

    pub(crate) fn contains(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .get(&session.id())
            .is_some_and(|current| Arc::ptr_eq(current.value(), session))
    }

    pub(crate) fn stats(&self) -> IndexStats {
        IndexStats {
            sessions: self.sessions.len(),
            users: self.uid_sessions.len(),
            groups: self.groups.len(),
        }
    }
}
