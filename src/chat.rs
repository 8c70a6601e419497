//! Messaging channels — per-patient history, the staff roster, and the
//! live connection registry.
//!
//! A channel is not a stored entity: it is the set of messages whose
//! `channel_owner_id` names one patient, plus whichever live connections
//! are currently joined to that owner id. Patients are pinned to their own
//! channel; staff may address any channel by patient id.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::repository::message;
use crate::db::repository::slot::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::identity::AuthUser;
use crate::models::enums::{Role, SlotState};
use crate::models::ChatMessage;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("staff role required")]
    Unauthorized,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Channel resolution + persistence
// ═══════════════════════════════════════════════════════════

/// Effective channel owner for a send or join: patients always land on
/// their own channel; staff land on the target when they name one.
pub fn resolve_channel_owner(sender: &AuthUser, target: Option<Uuid>) -> Uuid {
    match (sender.role, target) {
        (Role::Staff, Some(patient_id)) => patient_id,
        _ => sender.user_id,
    }
}

/// Persist one message on the sender's effective channel.
pub fn persist_message(
    conn: &Connection,
    sender: &AuthUser,
    target: Option<Uuid>,
    content: &str,
    now: NaiveDateTime,
) -> Result<ChatMessage, ChatError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::EmptyContent);
    }

    let persisted = ChatMessage {
        id: Uuid::new_v4(),
        channel_owner_id: resolve_channel_owner(sender, target),
        sender_id: sender.user_id,
        content: content.to_string(),
        sent_at: now,
    };
    message::insert_message(conn, &persisted)?;
    Ok(persisted)
}

/// Channel history, oldest first. A patient's request is always answered
/// with their own channel, whatever target they asked for.
pub fn history(
    conn: &Connection,
    requester: &AuthUser,
    target: Uuid,
) -> Result<Vec<ChatMessage>, ChatError> {
    let owner = match requester.role {
        Role::Staff => target,
        Role::Patient => requester.user_id,
    };
    Ok(message::messages_for_channel(conn, &owner)?)
}

// ═══════════════════════════════════════════════════════════
// Staff roster
// ═══════════════════════════════════════════════════════════

/// One row of the staff chat sidebar: a patient plus their current
/// booking, if they hold one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub booking_state: Option<SlotState>,
    pub booking_date_time: Option<NaiveDateTime>,
}

/// All patients with their latest booking status. Staff-only.
pub fn patient_roster(conn: &Connection, role: Role) -> Result<Vec<RosterEntry>, ChatError> {
    if role != Role::Staff {
        return Err(ChatError::Unauthorized);
    }

    let mut stmt = conn
        .prepare(
            "SELECT u.id, u.email, u.first_name, u.last_name, s.state, s.date_time
             FROM users u
             LEFT JOIN slots s ON s.patient_id = u.id AND s.state IN ('booked', 'confirmed')
             WHERE u.role = 'patient'
             ORDER BY u.email ASC",
        )
        .map_err(DatabaseError::from)?;

    let rows = stmt
        .query_map([], |row| {
            Ok(RosterRow {
                id: row.get(0)?,
                email: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                booking_state: row.get(4)?,
                booking_date_time: row.get(5)?,
            })
        })
        .map_err(DatabaseError::from)?;

    let mut roster = Vec::new();
    for row in rows {
        roster.push(roster_from_row(row.map_err(DatabaseError::from)?)?);
    }
    Ok(roster)
}

struct RosterRow {
    id: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    booking_state: Option<String>,
    booking_date_time: Option<String>,
}

fn roster_from_row(row: RosterRow) -> Result<RosterEntry, ChatError> {
    Ok(RosterEntry {
        id: parse_uuid(&row.id)?,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        booking_state: row
            .booking_state
            .as_deref()
            .map(SlotState::from_str)
            .transpose()?,
        booking_date_time: row
            .booking_date_time
            .as_deref()
            .map(parse_datetime)
            .transpose()?,
    })
}

// ═══════════════════════════════════════════════════════════
// WebSocket wire messages
// ═══════════════════════════════════════════════════════════

/// Client → server frames. Tags keep the event names the clients use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsIncoming {
    /// Join another patient's channel. Ignored for patient connections.
    JoinRoom { target_patient_id: Uuid },
    /// Send a message; staff may address a channel via target_patient_id.
    SendMessage {
        target_patient_id: Option<Uuid>,
        content: String,
    },
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsOutgoing {
    /// A persisted message, fanned out to every member of its channel
    /// (the sender included — delivery doubles as the send receipt).
    NewMessage { message: ChatMessage },
    /// Per-message failure, reported to the sender only.
    Error { message: String },
}

// ═══════════════════════════════════════════════════════════
// Live connection registry
// ═══════════════════════════════════════════════════════════

/// Which live connections are joined to which patient channel.
///
/// Mutated only on connect / joinRoom / disconnect; broadcast takes a
/// snapshot of the member senders under the lock and delivers outside it.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<Uuid, HashMap<Uuid, mpsc::Sender<WsOutgoing>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to a channel. A connection may be in several
    /// channels at once (staff working multiple conversations).
    pub fn join(
        &mut self,
        channel_owner_id: Uuid,
        connection_id: Uuid,
        sender: mpsc::Sender<WsOutgoing>,
    ) {
        self.channels
            .entry(channel_owner_id)
            .or_default()
            .insert(connection_id, sender);
    }

    /// Remove a connection from every channel it joined. Called on
    /// disconnect; empty channels are dropped from the map.
    pub fn leave_all(&mut self, connection_id: Uuid) {
        for members in self.channels.values_mut() {
            members.remove(&connection_id);
        }
        self.channels.retain(|_, members| !members.is_empty());
    }

    /// Snapshot of the senders currently joined to a channel.
    pub fn members(&self, channel_owner_id: &Uuid) -> Vec<mpsc::Sender<WsOutgoing>> {
        self.channels
            .get(channel_owner_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, channel_owner_id: &Uuid) -> usize {
        self.channels
            .get(channel_owner_id)
            .map_or(0, |members| members.len())
    }
}
