//! `/ws/frontend` (spec §6, "Front-end WebSocket channel"): fans out
//! [`crate::notifications::FrontendNotification`]s as they're published
//! by the store's event bus. Read-only from the client's perspective;
//! the only inbound message handled is a liveness ping.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::warn;

use crate::app_state::AppState;
use crate::notifications::FrontendNotification;

pub async fn frontend_ws_handler(ws: WebSocketUpgrade, State(app): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_frontend_socket(socket, app))
}

async fn handle_frontend_socket(socket: WebSocket, app: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut rx = app.frontend_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Ok(notification) = event else { break };
                let Ok(text) = serde_json::to_string(&notification) else { continue };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        let pong = serde_json::to_string(&FrontendNotification::Pong).unwrap();
                        if ws_tx.send(Message::Text(pong.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "frontend socket read failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
