//! WebSocket handler for playing a match.
//!
//! # Connection Flow
//!
//! 1. Client obtains a match id from the matchmaking RPC
//! 2. Client connects via `GET /ws/{match_id}?user_id=<id>&display_name=<name>`
//! 3. Server subscribes the socket to the match broadcasts, then joins the
//!    user. A user already connected or seated is refused at the subscribe
//!    step. A rejected join is answered with `{"error": reason}` and the
//!    socket is closed.
//! 4. Server spawns a send task that forwards broadcasts and replies,
//!    while the connection task forwards client moves to the match
//! 5. On disconnect the user leaves the match
//!
//! # Client Messages
//!
//! ```json
//! {"op_code": 4, "data": "1,1"}
//! {"op_code": 4, "data": {"row": 1, "col": 1}}
//! ```
//!
//! # Server Messages
//!
//! Broadcasts arrive as `{"op_code": n, "payload": <json>}` where opcodes
//! 1-3 carry the full match state and opcode 5 a private rejection notice.
//! Transport problems are reported as `{"error": message}`.

use std::collections::HashMap;

use axum::{
    extract::{
        Path, Query, State,
        ws::{
            CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code,
            rejection::WebSocketUpgradeRejection,
        },
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tictactoe::{
    JoinDecision, MatchHandle,
    entities::{JoinMetadata, MatchId, Presence, UserId},
    gateway::Outbound,
};
use tokio::sync::mpsc;

use super::{AppState, rate_limiter::MessageLimiter};
use crate::metrics;

/// Client message envelope
#[derive(Debug, Deserialize)]
struct ClientMessage {
    op_code: i64,
    /// Either the raw payload text or any JSON value
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    fn payload(&self) -> Vec<u8> {
        match &self.data {
            Value::String(text) => text.as_bytes().to_vec(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        }
    }
}

/// Broadcast envelope pushed to the client
#[derive(Debug, Serialize)]
struct ServerMessage {
    op_code: i64,
    payload: Value,
}

impl From<&Outbound> for ServerMessage {
    fn from(outbound: &Outbound) -> Self {
        let payload = serde_json::from_slice(&outbound.payload).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&outbound.payload).into_owned())
        });
        Self {
            op_code: outbound.op_code.code(),
            payload,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorMessage {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl ErrorMessage {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after_ms: None,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
    }
}

/// WebSocket upgrade handler.
///
/// Answers `404` for an unknown match and `400` for a missing, blank or
/// over-long `user_id` before attempting the upgrade. Remaining query
/// parameters are passed to the match as join metadata.
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Path(match_id): Path<String>,
    Query(mut query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Response {
    let match_id = MatchId::from(match_id);
    let Some(handle) = state.registry.get(&match_id).await else {
        return (StatusCode::NOT_FOUND, format!("Match {match_id} not found")).into_response();
    };

    let user_id = match query.remove("user_id").as_deref().map(UserId::parse) {
        Some(Ok(user_id)) => user_id,
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        None => return (StatusCode::BAD_REQUEST, "Missing user_id").into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let metadata = JoinMetadata::from_map(&query);
    let presence = Presence::new(user_id.clone(), user_id.as_str());
    let capacity = state.subscriber_capacity;

    ws.on_upgrade(move |socket| handle_socket(socket, handle, presence, metadata, capacity))
}

async fn handle_socket(
    socket: WebSocket,
    handle: MatchHandle,
    presence: Presence,
    metadata: JoinMetadata,
    capacity: usize,
) {
    let match_id = handle.match_id().clone();
    let user_id = presence.user_id.clone();
    let (mut sender, mut receiver) = socket.split();

    metrics::websocket_connected();
    info!("WebSocket connected: match={}, user={}", match_id, user_id);

    // Subscribe before joining so the MatchStarted broadcast is not missed.
    // The match refuses a user that is already seated or connected.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(capacity);
    match handle.subscribe(user_id.clone(), outbound_tx).await {
        Ok(true) => {}
        Ok(false) => {
            info!("Join rejected: match={}, user={}: already joined", match_id, user_id);
            close_with_error(&mut sender, "already joined").await;
            metrics::websocket_disconnected();
            return;
        }
        Err(e) => {
            error!("Failed to subscribe {} to match {}: {}", user_id, match_id, e);
            close_with_error(&mut sender, &e.to_string()).await;
            metrics::websocket_disconnected();
            return;
        }
    }

    match handle.join(presence, metadata).await {
        Ok(JoinDecision::Accept) => {}
        Ok(JoinDecision::Reject(reason)) => {
            info!("Join rejected: match={}, user={}: {}", match_id, user_id, reason);
            close_with_error(&mut sender, &reason).await;
            let _ = handle.unsubscribe(user_id).await;
            metrics::websocket_disconnected();
            return;
        }
        Err(e) => {
            error!("Failed to join {} to match {}: {}", user_id, match_id, e);
            close_with_error(&mut sender, &e.to_string()).await;
            metrics::websocket_disconnected();
            return;
        }
    }

    // Replies that only concern this socket
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(32);

    let send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                outbound = outbound_rx.recv() => match outbound {
                    Some(outbound) => match serde_json::to_string(&ServerMessage::from(&outbound)) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize broadcast: {}", e);
                            continue;
                        }
                    },
                    // The match dropped our subscription: it has stopped.
                    None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                Some(reply) = reply_rx.recv() => reply,
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
            metrics::websocket_messages_sent();
        }
    });

    let mut limiter = MessageLimiter::default();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();

                if let Err(limited) = limiter.check() {
                    warn!(
                        "{} rate limit exceeded for user {} (match {}). Dropping message.",
                        limited.window, user_id, match_id
                    );
                    metrics::rate_limit_hits_total("websocket");
                    let reply = ErrorMessage {
                        error: "Rate limit exceeded. Please slow down.".to_string(),
                        retry_after_ms: Some(limited.retry_after.as_millis() as u64),
                    };
                    let _ = reply_tx.send(reply.to_json()).await;
                    continue;
                }

                let client_msg = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(client_msg) => client_msg,
                    Err(e) => {
                        debug!("Failed to parse client message from {}: {}", user_id, e);
                        let reply = ErrorMessage::new("Invalid message format");
                        let _ = reply_tx.send(reply.to_json()).await;
                        continue;
                    }
                };

                let payload = client_msg.payload();
                if let Err(e) = handle
                    .submit(user_id.clone(), client_msg.op_code, payload)
                    .await
                {
                    warn!("Match {} stopped while {} was connected: {}", match_id, user_id, e);
                    break;
                }
                metrics::moves_submitted_total();
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket closed: match={}, user={}", match_id, user_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error for user {}: {}", user_id, e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();

    if handle.unsubscribe(user_id.clone()).await.is_ok() {
        match handle.leave(user_id.clone()).await {
            Ok(true) => info!("User {} left match {}", user_id, match_id),
            Ok(false) => debug!("User {} was not seated in match {}", user_id, match_id),
            Err(e) => debug!("Leave after disconnect failed: {}", e),
        }
    }

    metrics::websocket_disconnected();
}

async fn close_with_error(sender: &mut SplitSink<WebSocket, Message>, error: &str) {
    let _ = sender
        .send(Message::Text(ErrorMessage::new(error).to_json().into()))
        .await;
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "join failed".into(),
        })))
        .await;
}
