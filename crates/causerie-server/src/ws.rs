//! WebSocket transport: one task per connection.
//!
//! The task shuttles JSON frames both ways: inbound frames are parsed into
//! [`ClientEvent`]s (malformed frames are reported back, never forwarded to
//! the hub) and the hub's outbound queue is drained into the socket. Teardown
//! always goes through `Hub::disconnect`, which is idempotent.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, warn};

use causerie_shared::protocol::ClientEvent;
use causerie_shared::ChatError;

use crate::api::AppState;
use crate::throttle::EventThrottle;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| ws_connection(socket, state))
}

async fn ws_connection(mut socket: WebSocket, state: AppState) {
    let (conn, mut outbox) = state.hub.attach().await;
    let mut throttle = EventThrottle::default();
    debug!(conn = %conn, "WebSocket connection opened");

    loop {
        tokio::select! {
            outbound = outbox.recv() => {
                let Some(event) = outbound else {
                    break; // hub detached this connection
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(WsMessage::Text(json)).await.is_err() {
                            break; // client gone
                        }
                    }
                    Err(e) => {
                        warn!(conn = %conn, error = %e, "Failed to encode outbound event");
                    }
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(WsMessage::Text(raw))) => {
                        if !throttle.allow() {
                            debug!(conn = %conn, "Dropping event from flooding connection");
                            continue;
                        }
                        match serde_json::from_str::<ClientEvent>(&raw) {
                            Ok(event) => state.hub.handle_event(conn, event).await,
                            Err(e) => {
                                let err = ChatError::Malformed(format!("unrecognized event: {e}"));
                                state.hub.report_error(conn, &err).await;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames are not part of the protocol
                    Some(Err(e)) => {
                        debug!(conn = %conn, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.disconnect(conn).await;
    debug!(conn = %conn, "WebSocket connection closed");
}
