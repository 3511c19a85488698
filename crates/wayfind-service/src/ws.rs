//! WebSocket handler for live discovery updates.
//!
//! A client first receives every discovery so far (newest first), each as a
//! `discovered` event, then the engine's event stream as it happens.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use wayfind_core::EngineEvent;

use crate::state::AppState;

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Snapshot events for everything discovered so far, newest first.
pub async fn snapshot(state: &AppState) -> Vec<EngineEvent> {
    match state.store.lock().await.list_discoveries() {
        Ok(records) => records
            .into_iter()
            .map(|record| EngineEvent::Discovered { record })
            .collect(),
        Err(e) => {
            warn!("Failed to load discovery snapshot: {}", e);
            Vec::new()
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing discovered meanwhile is lost.
    let mut rx = state.engine.subscribe();

    info!("WebSocket client connected");

    for event in snapshot(&state).await {
        if let Ok(json) = serde_json::to_string(&event)
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            info!("WebSocket client disconnected during initial snapshot");
            return;
        }
    }

    debug!("Sent discovery snapshot to WebSocket client");

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, {} events dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Only close frames and errors matter from the client side.
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}
