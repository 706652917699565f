use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::Identity;
use crate::metrics::{ConnectionMetrics, PacketMetrics};
use crate::packet::Packet;
use crate::server::AppState;
use crate::session::{AddOutcome, RegistryError, Session};

use super::message::{close_code, OutboundMessage};

/// Close frame reasons are limited to 123 bytes by RFC 6455.
const MAX_CLOSE_REASON_BYTES: usize = 123;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub access_token: Option<String>,
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Registered,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Registered)
                | (Authenticating, Closed)
                | (Registered, Active)
                | (Registered, Closed)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    TransportError,
    TransportEnded,
    /// `Session::close()` was called, by a handler or by the writer task
    SessionClosed,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::TransportError => "transport_error",
            CloseReason::TransportEnded => "transport_ended",
            CloseReason::SessionClosed => "session_closed",
        }
    }
}

/// Credential lookup failed before authentication could run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCredential(&'static str);

type WsSink = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler. Authentication runs after the upgrade so
/// failures can be reported with a close code.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.access_token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = extract_credential(&query, &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, credential))
}

/// `Authorization: Bearer <token>` wins over the `access_token` query
/// parameter. A header that is present but unusable is an error, not a
/// fallback to the query.
pub fn extract_credential(
    query: &WsQuery,
    headers: &HeaderMap,
) -> Result<Option<String>, MalformedCredential> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| MalformedCredential("authorization header is not valid text"))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(MalformedCredential("authorization header is not a bearer token"))?;
        return Ok(Some(token.to_string()));
    }

    Ok(query.access_token.clone())
}

/// Drive one connection from authentication to deregistration.
#[tracing::instrument(name = "ws.connection", skip_all)]
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    credential: Result<Option<String>, MalformedCredential>,
) {
    let connection_start = Instant::now();
    let mut phase = ConnectionState::Connecting;
    let (mut ws_sender, ws_receiver) = socket.split();

    advance(&mut phase, ConnectionState::Authenticating);
    let identity = match authenticate(&state, credential).await {
        Ok(identity) => identity,
        Err((code, reason)) => {
            reject(&mut ws_sender, code, &reason).await;
            advance(&mut phase, ConnectionState::Closed);
            return;
        }
    };

    let (tx, rx) = mpsc::channel(state.settings.session.outbound_buffer.max(1));
    let session = Arc::new(Session::new(
        state.id_generator.next_id(),
        identity,
        tx.clone(),
    ));

    match state.registry.add(&session).await {
        Ok(AddOutcome::Added) | Ok(AddOutcome::AlreadyRegistered) => {}
        Err(e) => {
            match &e {
                RegistryError::Conflict(id) => {
                    tracing::error!(session_id = %id, "Session id already taken by another connection")
                }
                RegistryError::Index(err) => {
                    tracing::error!(error = %err, "Failed to register session")
                }
            }
            reject(&mut ws_sender, close_code::INTERNAL_ERROR, &e.to_string()).await;
            session.mark_closed();
            advance(&mut phase, ConnectionState::Closed);
            return;
        }
    }
    advance(&mut phase, ConnectionState::Registered);
    ConnectionMetrics::record_opened();

    tracing::info!(
        session_id = %session.id(),
        identity = %session.identity(),
        "WebSocket connection established"
    );

    let mut send_task = tokio::spawn(write_loop(ws_sender, rx, session.clone()));
    advance(&mut phase, ConnectionState::Active);

    let reason = receive_loop(ws_receiver, &state, &session).await;
    tracing::debug!(session_id = %session.id(), reason = reason.as_str(), "Receive loop ended");

    advance(&mut phase, ConnectionState::Closing);
    session.close();

    if let Err(e) = state.registry.remove(&session).await {
        tracing::error!(session_id = %session.id(), error = %e, "Failed to deregister session");
    }

    let flush_timeout = Duration::from_millis(state.settings.session.close_flush_timeout_ms);
    let flush = async {
        // Fails only when the writer is already gone
        let _ = tx
            .send(OutboundMessage::close(close_code::NORMAL, reason.as_str()))
            .await;
        let _ = (&mut send_task).await;
    };
    if tokio::time::timeout(flush_timeout, flush).await.is_err() {
        tracing::debug!(session_id = %session.id(), "Close frame flush timed out");
        send_task.abort();
    }

    session.mark_closed();
    advance(&mut phase, ConnectionState::Closed);

    let duration = connection_start.elapsed();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        session_id = %session.id(),
        identity = %session.identity(),
        reason = reason.as_str(),
        duration_secs = duration.as_secs_f64(),
        "WebSocket connection closed"
    );
}

fn advance(phase: &mut ConnectionState, next: ConnectionState) {
    debug_assert!(
        phase.can_transition_to(next),
        "invalid connection transition {:?} -> {:?}",
        phase,
        next
    );
    tracing::trace!(from = ?phase, to = ?next, "Connection state changed");
    *phase = next;
}

async fn authenticate(
    state: &AppState,
    credential: Result<Option<String>, MalformedCredential>,
) -> Result<Identity, (u16, String)> {
    let credential = match credential {
        Ok(credential) => credential,
        Err(MalformedCredential(reason)) => {
            ConnectionMetrics::record_auth_failure();
            tracing::warn!(reason, "Malformed credential");
            return Err((close_code::INVALID_PAYLOAD, reason.to_string()));
        }
    };

    state
        .auth
        .authorize(credential.as_deref())
        .await
        .map_err(|e| {
            ConnectionMetrics::record_auth_failure();
            tracing::warn!(error = %e, "Authentication failed");
            (close_code::POLICY_VIOLATION, e.to_string())
        })
}

/// Send a close frame on a connection that never got a session.
async fn reject(sink: &mut WsSink, code: u16, reason: &str) {
    let _ = sink.send(close_message(code, reason)).await;
    let _ = sink.close().await;
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: truncate_reason(reason).to_string().into(),
    }))
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Drain the session's outbound queue into the socket. A close item is the
/// last frame written. A write failure closes the session.
async fn write_loop(
    mut sink: WsSink,
    mut rx: mpsc::Receiver<OutboundMessage>,
    session: Arc<Session>,
) {
    while let Some(message) = rx.recv().await {
        let frame = match message {
            OutboundMessage::Packet(packet) => match packet.to_json() {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    tracing::error!(session_id = %session.id(), error = %e, "Failed to serialize packet");
                    continue;
                }
            },
            OutboundMessage::Serialized(text) => Message::Text(text.to_string().into()),
            OutboundMessage::Close { code, reason } => {
                let _ = sink.send(close_message(code, &reason)).await;
                break;
            }
        };

        if let Err(e) = sink.send(frame).await {
            tracing::debug!(session_id = %session.id(), error = %e, "WebSocket write failed");
            session.close();
            break;
        }
    }

    let _ = sink.close().await;
}

/// One sequential loop: a frame is fully dispatched before the next is read.
/// A close request interrupts the wait for a frame, never a running handler.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    state: &AppState,
    session: &Arc<Session>,
) -> CloseReason {
    loop {
        let frame = tokio::select! {
            biased;
            _ = session.closed() => return CloseReason::SessionClosed,
            frame = receiver.next() => frame,
        };

        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session.id(), error = %e, "WebSocket receive error");
                return CloseReason::TransportError;
            }
            None => return CloseReason::TransportEnded,
        };

        if !process_frame(frame, state, session).await {
            return CloseReason::ClientClosed;
        }
    }
}

/// Returns false when the client asked to close.
async fn process_frame(frame: Message, state: &AppState, session: &Arc<Session>) -> bool {
    session.update_activity();

    let decoded = match frame {
        Message::Text(text) => Packet::decode(text.as_str()),
        Message::Binary(bytes) => Packet::decode_slice(&bytes),
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => return true,
        Message::Close(_) => {
            tracing::debug!(session_id = %session.id(), "Received close frame");
            return false;
        }
    };

    match decoded {
        Ok(packet) => {
            PacketMetrics::record_received(&packet);
            state.dispatcher.dispatch(session, packet).await;
        }
        Err(e) => {
            PacketMetrics::record_decode_failure();
            tracing::debug!(session_id = %session.id(), error = %e, "Malformed packet");
            let _ = session
                .send(Packet::error("malformed packet", e.to_string()))
                .await;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn query(token: Option<&str>) -> WsQuery {
        WsQuery {
            access_token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_bearer_header_preferred_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));

        let credential = extract_credential(&query(Some("xyz")), &headers).unwrap();
        assert_eq!(credential.as_deref(), Some("abc"));
    }

    #[test]
    fn test_query_token_used_without_header() {
        let credential = extract_credential(&query(Some("xyz")), &HeaderMap::new()).unwrap();
        assert_eq!(credential.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_no_credential() {
        let credential = extract_credential(&query(None), &HeaderMap::new()).unwrap();
        assert!(credential.is_none());
    }

    #[test]
    fn test_non_bearer_header_is_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));

        assert!(extract_credential(&query(Some("xyz")), &headers).is_err());
    }

    #[test]
    fn test_empty_bearer_is_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));

        assert!(extract_credential(&query(None), &headers).is_err());
    }

    #[test]
    fn test_connection_transitions() {
        use ConnectionState::*;

        assert!(Connecting.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(Closed));
        assert!(Active.can_transition_to(Closing));
        assert!(!Active.can_transition_to(Registered));
        assert!(!Closed.can_transition_to(Active));
    }

    #[test]
    fn test_truncate_reason_on_char_boundary() {
        let reason = "é".repeat(100);
        let truncated = truncate_reason(&reason);

        assert!(truncated.len() <= MAX_CLOSE_REASON_BYTES);
        assert_eq!(truncated.len() % 2, 0);
        assert_eq!(truncate_reason("short"), "short");
    }
}
