//! WebSocket session handling.
//!
//! Each connection authenticates with its first frame, then becomes a
//! session: one task that alternates between inbound frames (processed
//! one at a time, so a slow handler never reorders a session's events)
//! and the outbound queue fed by handlers and the fan-out listener.

use crate::error::EventError;
use crate::handlers::dispatch;
use crate::metrics;
use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tandem_core::event::{InboundEvent, OutboundEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

/// How long a fresh connection may take to present its token.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// First frame of every connection: `{"token": "<bearer>"}`.
#[derive(Deserialize)]
struct AuthHandshake {
    #[serde(alias = "auth")]
    token: String,
}

/// GET /ws - upgrade and run the session.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| session(state, socket))
}

async fn session(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    let user_id = match authenticate(&state, &mut stream).await {
        Ok(user_id) => user_id,
        Err(message) => {
            tracing::debug!(%message, "Rejecting connection");
            let _ = send_event(&mut sink, &OutboundEvent::AuthError { message }).await;
            let _ = sink.close().await;
            return;
        }
    };

    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
    state.registry.add_connection(session_id, user_id, tx);
    metrics::CONNECTED_SESSIONS.inc();
    tracing::info!(%session_id, %user_id, "Session established");

    let connected = OutboundEvent::Connected {
        user_id,
        session_id,
    };
    if send_event(&mut sink, &connected).await.is_err() {
        state.registry.remove_connection(session_id);
        metrics::CONNECTED_SESSIONS.dec();
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    dispatch_frame(&state, session_id, user_id, text.as_str()).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(%session_id, error = %e, "Socket read failed");
                    break;
                }
            },
        }
    }

    // Disconnection cancels pending per-session work and every subscription.
    state.registry.remove_connection(session_id);
    metrics::CONNECTED_SESSIONS.dec();
    tracing::info!(%session_id, %user_id, "Session closed");
}

/// Read the handshake frame and verify the bearer token.
async fn authenticate(
    state: &AppState,
    stream: &mut SplitStream<WebSocket>,
) -> Result<Uuid, String> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
                Ok(Message::Binary(data)) => {
                    return Some(String::from_utf8_lossy(&data).into_owned());
                }
                // Handled by the server transport.
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Close(_)) | Err(_) => return None,
            }
        }
        None
    })
    .await;

    let payload = match first {
        Ok(Some(payload)) => payload,
        Ok(None) => return Err("connection closed during handshake".to_string()),
        Err(_) => return Err("authentication timed out".to_string()),
    };

    let handshake: AuthHandshake = serde_json::from_str(&payload)
        .map_err(|_| "handshake must carry an auth token".to_string())?;

    state
        .auth
        .verify(&handshake.token)
        .map_err(|e| e.to_string())
}

/// Decode and route one inbound frame, mapping every failure onto the
/// error taxonomy. The socket stays open for all of them.
async fn dispatch_frame(state: &AppState, session_id: Uuid, user_id: Uuid, text: &str) {
    let event: InboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            metrics::EVENTS_RECEIVED.with_label_values(&["unknown"]).inc();
            metrics::EVENT_ERRORS
                .with_label_values(&["validation_error"])
                .inc();
            state.registry.send_to(
                session_id,
                OutboundEvent::ValidationError {
                    message: format!("malformed frame: {e}"),
                    errors: Vec::new(),
                },
            );
            return;
        }
    };

    let name = event.name();
    metrics::EVENTS_RECEIVED.with_label_values(&[name]).inc();

    // Per-event re-check that the session is still bound to its user.
    if state.registry.user_of(session_id) != Some(user_id) {
        state.registry.send_to(
            session_id,
            OutboundEvent::AuthError {
                message: "unauthorized request".to_string(),
            },
        );
        return;
    }

    if let Err(e) = dispatch::handle_event(state, session_id, user_id, event).await {
        metrics::EVENT_ERRORS.with_label_values(&[e.kind()]).inc();
        match &e {
            EventError::Internal(detail) => {
                tracing::error!(event = name, %session_id, %detail, "Event handler failed");
            }
            other => {
                tracing::debug!(event = name, %session_id, kind = other.kind(), "Event rejected");
            }
        }
        for reply in e.into_events() {
            state.registry.send_to(session_id, reply);
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &OutboundEvent) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let payload = serde_json::to_string(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(payload.into())).await
}
