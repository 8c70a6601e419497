//! WebSocket layer for the real-time messaging channel.
//!
//! Connection lifecycle:
//! 1. Client opens `GET /ws?token=xxx` — the identity token is verified
//!    before the upgrade; a bad token never produces a session.
//! 2. Patient connections are joined to their own channel immediately;
//!    staff connections join channels explicitly with `joinRoom`.
//! 3. `sendMessage` persists first, then fans out to every member of the
//!    resolved channel — the sender included, so delivery doubles as the
//!    send receipt.
//! 4. Disconnect removes the connection from all channel memberships.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::chat::{self, WsIncoming, WsOutgoing};
use crate::core_state::CoreState;
use crate::identity::{self, AuthUser};
use crate::models::enums::Role;

/// Query parameters for the WebSocket upgrade.
#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

/// WebSocket upgrade handler.
///
/// Rejecting here (401) terminates the connection attempt before any
/// session state exists — there is no partially-authenticated socket.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Query(query): Query<WsAuthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = {
        let conn = ctx.core.open_db()?;
        identity::verify(&conn, &query.token)?
    };

    tracing::info!(user_id = %auth.user_id, role = auth.role.as_str(), "WebSocket connected");
    let core = ctx.core.clone();
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, core, auth)))
}

/// Main WebSocket connection handler.
///
/// Spawns a sender task for channel→WS forwarding, then runs the receive
/// loop until disconnect.
async fn handle_ws(socket: WebSocket, core: Arc<CoreState>, auth: AuthUser) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel::<WsOutgoing>(64);
    let connection_id = Uuid::new_v4();

    // Patients live in their own channel; staff join explicitly.
    if auth.role == Role::Patient {
        match core.channels() {
            Ok(mut channels) => channels.join(auth.user_id, connection_id, tx.clone()),
            Err(_) => return,
        }
    }

    // Sender task (reads from channel, writes to WebSocket)
    let sender_handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        let mut rx = rx;
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Receive loop
    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(ref text)) => match serde_json::from_str::<WsIncoming>(text) {
                Ok(incoming) => {
                    handle_incoming(&core, &auth, connection_id, incoming, &tx).await;
                }
                Err(_) => {
                    // Malformed frame fails alone; the connection lives on
                    let _ = tx
                        .send(WsOutgoing::Error {
                            message: "unrecognized message".to_string(),
                        })
                        .await;
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {} // Ping/Pong handled by the protocol layer
        }
    }

    // Cleanup: drop sender (stops sender task), leave all channels
    drop(tx);
    let _ = sender_handle.await;

    if let Ok(mut channels) = core.channels() {
        channels.leave_all(connection_id);
    }

    tracing::info!(user_id = %auth.user_id, "WebSocket disconnected");
}

async fn handle_incoming(
    core: &Arc<CoreState>,
    auth: &AuthUser,
    connection_id: Uuid,
    incoming: WsIncoming,
    tx: &mpsc::Sender<WsOutgoing>,
) {
    match incoming {
        WsIncoming::JoinRoom { target_patient_id } => {
            // Patients cannot join other channels — silently ignored,
            // matching what a client that mistakenly tries it expects.
            if auth.role != Role::Staff {
                return;
            }
            if let Ok(mut channels) = core.channels() {
                channels.join(target_patient_id, connection_id, tx.clone());
                tracing::info!(
                    staff_id = %auth.user_id,
                    patient_id = %target_patient_id,
                    "Staff joined channel"
                );
            }
        }
        WsIncoming::SendMessage {
            target_patient_id,
            content,
        } => {
            handle_send(core, auth, target_patient_id, content, tx).await;
        }
    }
}

/// Persist a message, then broadcast it to the channel's members.
///
/// Persistence failure is reported to the sender only — nothing that was
/// not stored is ever broadcast.
async fn handle_send(
    core: &Arc<CoreState>,
    auth: &AuthUser,
    target_patient_id: Option<Uuid>,
    content: String,
    tx: &mpsc::Sender<WsOutgoing>,
) {
    let persist_core = core.clone();
    let sender = *auth;

    // Blocking DB work on a dedicated thread
    let persisted = tokio::task::spawn_blocking(move || {
        let conn = persist_core.open_db().map_err(|e| e.to_string())?;
        chat::persist_message(
            &conn,
            &sender,
            target_patient_id,
            &content,
            Utc::now().naive_utc(),
        )
        .map_err(|e| e.to_string())
    })
    .await;

    let message = match persisted {
        Ok(Ok(message)) => message,
        Ok(Err(reason)) => {
            let _ = tx.send(WsOutgoing::Error { message: reason }).await;
            return;
        }
        Err(join_err) => {
            tracing::error!("send task failed: {join_err}");
            let _ = tx
                .send(WsOutgoing::Error {
                    message: "message could not be stored".to_string(),
                })
                .await;
            return;
        }
    };

    // Snapshot members under the lock, deliver outside it
    let members = match core.channels() {
        Ok(channels) => channels.members(&message.channel_owner_id),
        Err(_) => return,
    };

    let outgoing = WsOutgoing::NewMessage { message };
    for member in members {
        let _ = member.send(outgoing.clone()).await;
    }
}
