//! Per-connection WebSocket handling.
//!
//! Each accepted socket gets a [`ConnectionHandle`] in the registry and two
//! halves running side by side:
//! - the writer drains the handle's frame channel into the socket
//! - the reader answers text frames with an echo and watches for close
//!
//! Whichever half finishes first ends the connection, and the handle is
//! unregistered. When the registry drops the handle (eviction or shutdown)
//! the frame channel closes and the writer finishes on its own.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use scan_core::ConnectionId;
use scan_protocol::echo_reply;

use super::AppState;
use crate::registry::{ConnectionHandle, Frame};

/// Close code sent when the registry is full (RFC 6455 "try again later").
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let id = ConnectionId::new(state.connection_counter.fetch_add(1, Ordering::Relaxed));
    let (handle, frames) = ConnectionHandle::channel(id, state.config.stream.connection_buffer);
    let replies = handle.downgrade();

    if let Err(e) = state.registry.register(handle).await {
        warn!(connection = %id, error = %e, "Rejecting stream connection");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: e.to_string().into(),
            })))
            .await;
        return;
    }

    let (sink, stream) = socket.split();

    tokio::select! {
        _ = write_frames(sink, frames) => {
            debug!(connection = %id, "Stream writer finished");
        }
        _ = read_client(stream, replies, id) => {
            debug!(connection = %id, "Client closed stream");
        }
        _ = state.shutdown.cancelled() => {
            debug!(connection = %id, "Closing stream for shutdown");
        }
    }

    state.registry.unregister(id).await;
}

/// Forwards queued frames to the socket until the channel or socket closes.
async fn write_frames(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Frame>,
) {
    while let Some(frame) = frames.recv().await {
        if sink.send(Message::Text(frame.to_string())).await.is_err() {
            return;
        }
    }
    let _ = sink.close().await;
}

/// Echoes client text frames until the client goes away.
async fn read_client(
    mut stream: futures::stream::SplitStream<WebSocket>,
    replies: mpsc::WeakSender<Frame>,
    id: ConnectionId,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let Some(sender) = replies.upgrade() else {
                    return;
                };
                let reply: Frame = Arc::from(echo_reply(&text));
                if sender.send(reply).await.is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "Stream read error");
                return;
            }
        }
    }
}
