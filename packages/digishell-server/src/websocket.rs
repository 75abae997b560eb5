use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use digishell_core::LinkEvent;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::{envelope, AppState};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id = state.next_conn_id.fetch_add(1, Ordering::SeqCst);

    // Subscribe before reading the current status so no edge falls in between
    let (subscriber, mut events) = state.broadcaster.subscribe();
    info!(conn_id, subscriber, "websocket client connected");

    let initial = LinkEvent::Connection(state.current_connection().await);
    let sent = match envelope(&initial) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(conn_id, "failed to encode connection status: {}", e);
            false
        }
    };
    if !sent {
        state.broadcaster.unsubscribe(subscriber);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match envelope(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(conn_id, event = event.type_name(), "failed to encode event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients only keep the socket alive; anything they send is ignored
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!(conn_id, len = text.as_str().len(), "ignoring client message")
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.unsubscribe(subscriber);
    info!(conn_id, "websocket client disconnected");
}
