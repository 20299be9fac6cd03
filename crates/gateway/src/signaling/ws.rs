//! WebSocket endpoint for meeting signaling.
//!
//! Flow:
//! 1. Client connects to `/v1/meetings/{id}/ws?token=<jwt>`
//! 2. Gateway verifies the token, registers the connection (displacing any
//!    prior socket for the same user) and sends `connected`
//! 3. Inbound messages run through the dispatch table until `leave` or the
//!    socket closes; then the registry entry is removed and
//!    `participant-left` is broadcast

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use cf_domain::signaling::{ClientMessage, ParticipantInfo, ServerMessage};

use crate::signaling::dispatch::{self, DispatchContext, DispatchOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /v1/meetings/{id}/ws — upgrade to WebSocket.
pub async fn meeting_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    let claims = match state.auth.verify(&token) {
        Ok(claims) => claims,
        Err(_) => {
            return (axum::http::StatusCode::UNAUTHORIZED, "invalid or missing token")
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, meeting_id, claims))
        .into_response()
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    meeting_id: String,
    claims: crate::auth::AuthClaims,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let user_id = claims.user_id.clone();

    let participant = ParticipantInfo {
        user_id: user_id.clone(),
        user_name: claims.user_name,
        role: claims.role,
        audio_muted: false,
    };

    // Outbound channel: registry writes here, the writer task drains it.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(64);

    // Displacement: one live connection per (meeting, user). The old
    // socket's channel is dropped, which ends its writer task, and the
    // room hears the leave before the re-join.
    let (displaced, generation) = state.registry.connect(&meeting_id, participant, outbound_tx);
    if displaced.is_some() {
        state
            .registry
            .broadcast(
                &meeting_id,
                ServerMessage::ParticipantLeft {
                    user_id: user_id.clone(),
                },
                Some(&user_id),
            )
            .await;
    }

    tracing::info!(meeting_id = %meeting_id, user_id = %user_id, "signaling connected");

    state
        .registry
        .send_to_user(
            &meeting_id,
            &user_id,
            ServerMessage::Connected {
                user_id: user_id.clone(),
            },
        )
        .await;

    // Writer task: forwards outbound messages to the socket.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let ctx = DispatchContext {
        registry: state.registry.clone(),
        chat: state.chat.clone(),
        meeting_id: meeting_id.clone(),
        user_id: user_id.clone(),
    };

    // Reader loop. Handlers never throw across this boundary: bad payloads
    // log and continue.
    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_message) => {
                    if dispatch::dispatch(&ctx, client_message).await == DispatchOutcome::Stop {
                        break;
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        meeting_id = %meeting_id,
                        user_id = %user_id,
                        "unknown or malformed signaling message"
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup — only if this socket still owns the registry entry (a
    // displaced socket must not tear down its successor).
    if state.registry.disconnect_if(&meeting_id, &user_id, generation) {
        state
            .registry
            .broadcast(
                &meeting_id,
                ServerMessage::ParticipantLeft {
                    user_id: user_id.clone(),
                },
                None,
            )
            .await;
    }
    writer.abort();
    tracing::info!(meeting_id = %meeting_id, user_id = %user_id, "signaling disconnected");
}
