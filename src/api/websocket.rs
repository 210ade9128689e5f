//! WebSocket handler for real-time metric streaming

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::actors::broadcaster::MetricsEnvelope;
use crate::api::state::ApiState;

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

fn encode(envelope: &MetricsEnvelope) -> Option<Message> {
    match serde_json::to_string(envelope) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!("failed to encode metrics push: {e}");
            None
        }
    }
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let subscription = match state.broadcaster.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("failed to subscribe to metrics pushes: {e}");
            return;
        }
    };
    let mut updates = subscription.updates;

    if let Some(message) = encode(&subscription.snapshot)
        && sender.send(message).await.is_err()
    {
        debug!("WebSocket send failed, client disconnected");
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let envelope: Arc<MetricsEnvelope> = match updates.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    // the next push carries the full view anyway
                    debug!("WebSocket client lagged, skipped {skipped} pushes");
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!("broadcast channel closed");
                    break;
                }
            };

            if let Some(message) = encode(&envelope)
                && sender.send(message).await.is_err()
            {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Incoming messages are ignored apart from close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket client disconnected");
}
