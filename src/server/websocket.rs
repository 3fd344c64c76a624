use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::AppState;
use crate::relay::RelayMessage;

/// Handle WebSocket upgrade request
pub async fn live_feed(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// one socket, one live session; the session dies with the socket
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<RelayMessage>(32);

    let mut session = state.relay.session(tx);
    session.start();
    tracing::info!(active = state.relay.active_sessions(), "live client connected");

    // writer: relay messages out as JSON text frames
    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("failed to encode relay message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // reader: nothing is expected from the client except close/ping
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("websocket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
            // writer ended: the socket can't take more frames
            _ = &mut writer => break,
        }
    }

    session.shutdown().await;
    writer.abort();
    tracing::info!(active = state.relay.active_sessions(), "live client disconnected");
}
