//! WebSocket endpoint for publishers.
//!
//! Connection lifecycle:
//! - The upgrade request is authenticated first; a missing or wrong
//!   connection key is refused with 401 and no WebSocket is ever opened.
//! - On success the server sends `hello`, then answers each inbound frame in
//!   arrival order with exactly one reply.
//! - When the peer goes away, queued frames are dropped and the in-flight
//!   handler is abandoned. File mutations already applied stay applied.

pub mod dispatcher;

use crate::auth;
use crate::state::AppState;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use deploy_core::ServerMessage;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(e) = auth::authorize(&headers, &state.config.shared_secret) {
        warn!("Terminated connection: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| {
        let connection_id = uuid::Uuid::new_v4();
        handle_socket(socket, state).instrument(tracing::info_span!("connection", id = %connection_id))
    })
}

/// Handle an authenticated publisher connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    state.connections.fetch_add(1, Ordering::Relaxed);
    info!("Publisher connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<String>();
    let closed = CancellationToken::new();

    // Forward replies to the publisher
    let mut send_task = tokio::spawn(
        async move {
            while let Some(message) = rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to serialize reply: {:?}", e);
                    }
                }
            }
        }
        .in_current_span(),
    );

    let _ = tx.send(ServerMessage::hello());

    // Read frames until the peer closes
    let recv_closed = closed.clone();
    let mut recv_task = tokio::spawn(
        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        if inbound_tx.send(text.to_string()).is_err() {
                            break;
                        }
                    }
                    Message::Binary(_) => warn!("Ignoring binary frame"),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            recv_closed.cancel();
        }
        .in_current_span(),
    );

    // Answer frames in arrival order
    let dispatch_state = state.clone();
    let dispatch_tx = tx.clone();
    let mut dispatch_task = tokio::spawn(
        async move {
            while let Some(text) = inbound_rx.recv().await {
                let reply = tokio::select! {
                    biased;
                    _ = closed.cancelled() => {
                        debug!("Connection closed, dropping remaining frames");
                        break;
                    }
                    reply = dispatcher::handle_frame(&dispatch_state, &text) => reply,
                };
                if dispatch_tx.send(reply).is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );
    drop(tx);

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            dispatch_task.abort();
        }
        _ = &mut dispatch_task => {
            recv_task.abort();
            let _ = send_task.await;
        }
    }

    state.connections.fetch_sub(1, Ordering::Relaxed);
    info!("Publisher disconnected");
}
