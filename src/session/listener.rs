use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::packet::GroupId;

use super::Session;

/// Index sizes observed right after a mutation committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub sessions: usize,
    pub users: usize,
    pub groups: usize,
}

/// Registry lifecycle notifications. `After*` events fire only when the
/// mutation actually changed the registry. `Before*` events are not
/// deduplicated: racing removals of one session may each report
/// `BeforeRemove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    BeforeAdd,
    AfterAdd(IndexStats),
    BeforeRemove,
    AfterRemove(IndexStats),
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::BeforeAdd => "before_add",
            SessionEvent::AfterAdd(_) => "after_add",
            SessionEvent::BeforeRemove => "before_remove",
            SessionEvent::AfterRemove(_) => "after_remove",
        }
    }
}

/// Group subscription notifications, one per group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    BeforeSub(GroupId),
    AfterSub(GroupId, IndexStats),
    BeforeUnsub(GroupId),
    AfterUnsub(GroupId, IndexStats),
}

impl GroupEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupEvent::BeforeSub(_) => "before_sub",
            GroupEvent::AfterSub(..) => "after_sub",
            GroupEvent::BeforeUnsub(_) => "before_unsub",
            GroupEvent::AfterUnsub(..) => "after_unsub",
        }
    }

    pub fn group_id(&self) -> GroupId {
        match *self {
            GroupEvent::BeforeSub(g)
            | GroupEvent::AfterSub(g, _)
            | GroupEvent::BeforeUnsub(g)
            | GroupEvent::AfterUnsub(g, _) => g,
        }
    }
}

#[async_trait]
pub trait SessionListener: Send + Sync + 'static {
    async fn on_event(&self, event: SessionEvent, session: Arc<Session>) -> anyhow::Result<()>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
pub trait GroupListener: Send + Sync + 'static {
    async fn on_event(&self, event: GroupEvent, session: Arc<Session>) -> anyhow::Result<()>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Append-only list of listeners. Notification snapshots the list so
/// registering never waits on a running notification.
pub(crate) struct ListenerSet<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub async fn push(&self, listener: Arc<L>) {
        self.listeners.write().await.push(listener);
    }

    pub async fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.read().await.clone()
    }
}

impl ListenerSet<dyn SessionListener> {
    pub async fn notify(&self, event: SessionEvent, session: &Arc<Session>) {
        let calls = self.snapshot().await.into_iter().map(|listener| {
            let session = session.clone();
            let name = listener.name();
            let call: BoxFuture<'static, anyhow::Result<()>> =
                Box::pin(async move { listener.on_event(event, session).await });
            (name, call)
        });
        run_isolated(event.as_str(), session, calls).await;
    }
}

impl ListenerSet<dyn GroupListener> {
    pub async fn notify(&self, event: GroupEvent, session: &Arc<Session>) {
        let calls = self.snapshot().await.into_iter().map(|listener| {
            let session = session.clone();
            let name = listener.name();
            let call: BoxFuture<'static, anyhow::Result<()>> =
                Box::pin(async move { listener.on_event(event, session).await });
            (name, call)
        });
        run_isolated(event.as_str(), session, calls).await;
    }
}

/// Runs every call on its own task and waits for all of them. Errors and
/// panics are logged per listener and never reach the caller.
async fn run_isolated<I>(event: &'static str, session: &Session, calls: I)
where
    I: IntoIterator<Item = (&'static str, BoxFuture<'static, anyhow::Result<()>>)>,
{
    let (names, handles): (Vec<_>, Vec<_>) = calls
        .into_iter()
        .map(|(name, call)| (name, tokio::spawn(call)))
        .unzip();

    if handles.is_empty() {
        return;
    }

    for (name, result) in names.into_iter().zip(join_all(handles).await) {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    listener = name,
                    event,
                    session_id = %session.id(),
                    error = %e,
                    "Listener failed"
                );
            }
            Err(e) => {
                tracing::error!(
                    listener = name,
                    event,
                    session_id = %session.id(),
                    error = %e,
                    "Listener panicked"
                );
            }
        }
    }
}
