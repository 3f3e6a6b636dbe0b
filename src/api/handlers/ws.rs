//! WebSocket endpoint for realtime notification delivery.
//!
//! Clients connect with their bearer token (query parameter or Authorization
//! header), land in their account's room, and receive `notification` frames
//! as JSON text. The only inbound message honored is `ping`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Query, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::api::hub::NotificationHub;
use crate::auth::RequestGate;

use super::gate_error_response;

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Upgrade handler; the token is validated before the upgrade completes.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsQuery>,
    gate: Extension<Arc<RequestGate>>,
    hub: Extension<Arc<NotificationHub>>,
) -> Response {
    let principal = match params.token {
        Some(token) => gate.authorize_token(&token).await,
        None => gate.authorize(&headers).await,
    };
    let principal = match principal {
        Ok(principal) => principal,
        Err(err) => return gate_error_response(&err),
    };

    let hub = hub.0.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, principal.account_id, hub))
        .into_response()
}

async fn handle_socket(socket: WebSocket, account_id: Uuid, hub: Arc<NotificationHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let conn_id = hub.join(account_id, tx.clone());
    debug!(%account_id, conn_id, "websocket joined room");

    let connected = json!({ "type": "connected" }).to_string();
    let _ = sender.send(Message::Text(connected.into())).await;

    // Forward room frames to the socket until either side goes away.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let tx_for_recv = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if text.contains("\"ping\"") {
                        let pong = json!({ "type": "pong" }).to_string();
                        let _ = tx_for_recv.send(pong);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.leave(account_id, conn_id);
    debug!(%account_id, conn_id, "websocket left room");
}
