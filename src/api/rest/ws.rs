use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WsQuery {
    /// The connecting user's own id; events addressed to them as
    /// customer, owner or courier are forwarded.
    pub subject: Uuid,
    /// Optionally also watch one order's tracking room.
    pub order: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let (mut sender, mut receiver) = socket.split();
    let rx = state.fanout.subscribe();

    info!(subject = %query.subject, "websocket client connected");

    let send_task = tokio::spawn(async move {
        let mut events = BroadcastStream::new(rx);

        while let Some(result) = events.next().await {
            // a lagged receiver just skips what it missed
            let Ok(event) = result else { continue };

            let addressed = event.audience.addressed_to(query.subject)
                || query
                    .order
                    .is_some_and(|order_id| event.audience.order_room() == Some(order_id));
            if !addressed {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notification for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(subject = %query.subject, "websocket client disconnected");
}
