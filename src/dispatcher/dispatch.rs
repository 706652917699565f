use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::metrics::PacketMetrics;
use crate::packet::Packet;
use crate::session::Session;

use super::handlers::{self, HandlerContext};
use super::PacketHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// The handler refused the packet; the sender got an error packet
    Rejected,
    /// No handler for the namespace; the sender got an error packet
    UnknownNamespace,
    /// Session no longer open; nothing happened
    Ignored,
}

/// Collects the namespace to handler table before it is frozen.
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<&'static str, Arc<dyn PacketHandler>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with the ping, message and subscription handlers installed.
    pub fn with_default_handlers(ctx: HandlerContext) -> Self {
        handlers::install(Self::new(), ctx)
    }

    /// Register `handler` for `ns`, replacing any previous one.
    pub fn handler(mut self, ns: &'static str, handler: Arc<dyn PacketHandler>) -> Self {
        if self.handlers.insert(ns, handler).is_some() {
            tracing::warn!(ns, "Replacing packet handler");
        }
        self
    }

    pub fn build(self) -> PacketDispatcher {
        PacketDispatcher {
            handlers: self.handlers,
        }
    }
}

/// Routes each inbound packet to the handler registered for its namespace.
pub struct PacketDispatcher {
    handlers: HashMap<&'static str, Arc<dyn PacketHandler>>,
}

impl PacketDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(session_id = %session.id(), ns = %packet.ns())
    )]
    pub async fn dispatch(&self, session: &Arc<Session>, packet: Packet) -> DispatchOutcome {
        if !session.is_open() {
            tracing::trace!("Session not open, dropping packet");
            return DispatchOutcome::Ignored;
        }

        let Some(handler) = self.handlers.get(packet.ns()) else {
            PacketMetrics::record_unknown_namespace();
            tracing::debug!("No handler for namespace");

            let reply = Packet::error(
                "unknown namespace",
                format!("no handler for namespace '{}'", packet.ns()),
            );
            let _ = session.send(reply).await;
            return DispatchOutcome::UnknownNamespace;
        };

        // A panicking handler must not unwind the connection task
        let outcome = AssertUnwindSafe(handler.handle(session, packet))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                PacketMetrics::record_rejected();
                tracing::debug!(error = %e, "Packet rejected");

                let _ = session.send(e.to_packet()).await;
                DispatchOutcome::Rejected
            }
            Err(panic) => {
                PacketMetrics::record_rejected();
                tracing::error!(panic = panic_message(&*panic), "Packet handler panicked");

                let reply = Packet::error("internal error", "packet handler failed");
                let _ = session.send(reply).await;
                DispatchOutcome::Rejected
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::auth::Identity;
    use crate::dispatcher::HandlerError;
    use crate::session::SessionId;
    use crate::websocket::OutboundMessage;

    struct Panicking;

    #[async_trait]
    impl PacketHandler for Panicking {
        async fn handle(&self, _session: &Arc<Session>, _packet: Packet) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    struct Echo;

    #[async_trait]
    impl PacketHandler for Echo {
        async fn handle(&self, session: &Arc<Session>, packet: Packet) -> Result<(), HandlerError> {
            let _ = session.send(packet).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error_packet() {
        let dispatcher = PacketDispatcher::builder()
            .handler("ping", Arc::new(Panicking))
            .build();
        let (session, mut rx) = Session::open(SessionId::new(1), Identity::User { uid: 1 }, 4);

        let outcome = dispatcher.dispatch(&session, Packet::Ping).await;
        assert_eq!(outcome, DispatchOutcome::Rejected);
        assert!(session.is_open());

        match rx.recv().await {
            Some(OutboundMessage::Packet(Packet::Error { title, .. })) => {
                assert_eq!(title, "internal error")
            }
            other => panic!("unexpected outbound message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_namespace_and_closed_session() {
        let dispatcher = PacketDispatcher::builder()
            .handler("ping", Arc::new(Echo))
            .build();
        let (session, mut rx) = Session::open(SessionId::new(1), Identity::Anonymous, 4);

        assert_eq!(
            dispatcher.dispatch(&session, Packet::Ping).await,
            DispatchOutcome::Handled
        );
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Packet(Packet::Ping))));

        assert_eq!(
            dispatcher.dispatch(&session, Packet::Pong).await,
            DispatchOutcome::UnknownNamespace
        );

        session.close();
        assert_eq!(
            dispatcher.dispatch(&session, Packet::Ping).await,
            DispatchOutcome::Ignored
        );
    }
}
