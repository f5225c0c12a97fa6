use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::ws::message;

/// Axum handler: upgrades HTTP to WebSocket at GET / and GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection event loop: lives for the entire WS session.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(state.config.relay.client_queue.max(1));
    let client_id = state.hub.connect(out_tx);
    info!(client_id = %client_id, "connection from client");

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = message::handle(client_id, text.as_str(), &state.hub) {
                            if e.is_fatal() {
                                warn!(client_id = %client_id, code = e.code(), error = %e, "closing client connection");
                                break;
                            }
                            debug!(client_id = %client_id, error = %e, "inbound frame dropped");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(client_id = %client_id, error = %e, "client socket error");
                        break;
                    }
                    _ => {}
                }
            }

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let orphaned = state.hub.disconnect(client_id);
    info!(client_id = %client_id, released_accounts = orphaned.len(), "close connection with client");
}
