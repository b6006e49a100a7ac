//! WebSocket handler for client connections.

use axum::{
    body::Bytes,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use troupe_protocol::ServerFrame;

use crate::api::{ApiError, AppState};

use super::session::{CONNECTED_MESSAGE, Session};

/// Reserved sub-protocol used by dev tooling (Vite HMR). Connections that
/// negotiate it are not application traffic and are never handed a session.
pub const RESERVED_DEV_PROTOCOL: &str = "vite-hmr";

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// Size of the per-connection outbound buffer.
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// WebSocket upgrade handler.
///
/// GET /api/ws
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if let Some(protocols) = headers
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok())
    {
        if protocols
            .split(',')
            .any(|p| p.trim() == RESERVED_DEV_PROTOCOL)
        {
            debug!("rejecting connection negotiating reserved sub-protocol {protocols:?}");
            return Err(ApiError::forbidden("Reserved sub-protocol"));
        }
    }

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state)))
}

/// Run one connection to completion.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = state.connections.register();
    info!("WebSocket connection {conn_id} established");

    let (mut sender, mut receiver) = socket.split();

    // Connection confirmation goes out before anything else so the client's
    // "connecting" state can resolve.
    let connected = ServerFrame::Connected {
        content: CONNECTED_MESSAGE.to_string(),
    };
    if let Err(e) = sender
        .send(Message::Text(
            serde_json::to_string(&connected).unwrap().into(),
        ))
        .await
    {
        error!("failed to send connected frame on connection {conn_id}: {e}");
        state.connections.unregister(conn_id);
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER_SIZE);

    // Writer task: serializes outbound frames and keeps the transport alive
    // with periodic pings.
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                frame = out_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to serialize frame: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }

                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Frame loop. `handle_frame` runs each request to its terminal event
    // before the next inbound frame is read, so requests on one connection
    // are processed strictly sequentially.
    let mut session = Session::new(state.completion.clone());
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if session.handle_frame(text.as_str(), &out_tx).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("ignoring binary message on connection {conn_id}");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("connection {conn_id} closed by client");
                break;
            }
            Err(e) => {
                warn!("WebSocket error on connection {conn_id}: {e}");
                break;
            }
        }
    }

    send_task.abort();
    state.connections.unregister(conn_id);
    info!("WebSocket connection {conn_id} closed");
}
