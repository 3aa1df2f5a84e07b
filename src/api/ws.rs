// WebSocket handler streaming change notifications for one fight.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};

use super::AppState;
use crate::metrics;

/// WebSocket upgrade handler for a fight's notification stream.
pub async fn ws_fight(
    ws: WebSocketUpgrade,
    Path(fight_id): Path<i64>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, fight_id, state))
}

async fn handle_ws(mut socket: WebSocket, fight_id: i64, state: AppState) {
    let mut rx = state.notifier.subscribe();
    metrics::CONNECTED_WEBSOCKETS.inc();
    tracing::debug!(fight_id, "WebSocket subscriber connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) if msg.fight_id == fight_id => {
                        if socket.send(Message::Text(msg.payload.into())).await.is_err() {
                            // Client disconnected
                            break;
                        }
                        metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(fight_id, "WebSocket client lagged, skipped {n} messages");
                    }
                }
            }
            // Clients only listen; anything they send besides Close is ignored.
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    metrics::CONNECTED_WEBSOCKETS.dec();
    tracing::debug!(fight_id, "WebSocket subscriber disconnected");
}
