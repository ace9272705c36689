pub mod admin;
pub mod audience;
pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::protocol::{AdminQuestionInfo, ClientMessage, QuestionInfo, ServerMessage};
use crate::state::AppState;
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    /// Known device id, if the client has one stored. Also used by the
    /// anti-abuse layer as the rate-limit key.
    pub device_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: role={:?} device={:?}",
        params.role,
        params.device_id
    );
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Handle an individual WebSocket connection.
///
/// Connecting subscribes the client to the collection: the current
/// snapshot is delivered immediately, then again on every change.
/// Dropping the connection drops the broadcast receiver, which is the
/// unsubscribe.
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let role = match params.role.as_deref() {
        Some("admin") => Role::Admin,
        Some("display") => Role::Display,
        _ => Role::Audience,
    };

    tracing::info!("WebSocket connected with role: {:?}", role);

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        role: role.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    // Initial snapshot, before any change notification
    let snapshot = state.snapshot().await;
    let public: Vec<QuestionInfo> = snapshot.iter().map(|q| q.into()).collect();
    if !send(&mut sender, &ServerMessage::Questions { list: public }).await {
        return;
    }

    let raffle = state.raffle_state().await;
    let raffle_msg = ServerMessage::RaffleState {
        active: raffle.active,
        winner: raffle.winner,
    };
    if !send(&mut sender, &raffle_msg).await {
        return;
    }

    if role == Role::Admin {
        let devices = state.devices.read().await;
        let admin_list: Vec<AdminQuestionInfo> = snapshot
            .iter()
            .map(|q| {
                let label = q
                    .device_id
                    .as_ref()
                    .and_then(|d| devices.get(d))
                    .map(|r| r.label.clone());
                AdminQuestionInfo::new(q, label)
            })
            .collect();
        drop(devices);

        if !send(&mut sender, &ServerMessage::AdminQuestions { list: admin_list }).await {
            return;
        }

        let stats = crate::broadcast::stats_message(&state).await;
        if !send(&mut sender, &stats).await {
            return;
        }
    }

    // Subscribe to change notifications (all clients)
    let mut broadcast_rx = state.broadcast.subscribe();

    // Admin connections additionally get the admin-only channel
    let mut admin_rx = if role == Role::Admin {
        Some(state.admin_broadcast.subscribe())
    } else {
        None
    };

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                if let Ok(msg) = broadcast_msg {
                    if !send(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            admin_msg = async {
                match &mut admin_rx {
                    Some(rx) => rx.recv().await.ok(),
                    // Non-admin: wait forever
                    None => std::future::pending::<Option<ServerMessage>>().await,
                }
            } => {
                if let Some(msg) = admin_msg {
                    if !send(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &role, &state).await
                                {
                                    if !send(&mut sender, &response).await {
                                        tracing::error!("Failed to send response");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                let _ = send(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", role);
}
