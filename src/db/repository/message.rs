use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::slot::{parse_datetime, parse_uuid, DATETIME_FORMAT};
use crate::db::DatabaseError;
use crate::models::ChatMessage;

pub fn insert_message(conn: &Connection, msg: &ChatMessage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_messages (id, channel_owner_id, sender_id, content, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            msg.id.to_string(),
            msg.channel_owner_id.to_string(),
            msg.sender_id.to_string(),
            msg.content,
            msg.sent_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

/// Full history of one patient's channel, oldest first.
pub fn messages_for_channel(
    conn: &Connection,
    channel_owner_id: &Uuid,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, channel_owner_id, sender_id, content, sent_at
         FROM chat_messages WHERE channel_owner_id = ?1
         ORDER BY sent_at ASC",
    )?;

    let rows = stmt.query_map(params![channel_owner_id.to_string()], |row| {
        Ok(MessageRow {
            id: row.get(0)?,
            channel_owner_id: row.get(1)?,
            sender_id: row.get(2)?,
            content: row.get(3)?,
            sent_at: row.get(4)?,
        })
    })?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(message_from_row(row?)?);
    }
    Ok(messages)
}

struct MessageRow {
    id: String,
    channel_owner_id: String,
    sender_id: String,
    content: String,
    sent_at: String,
}

fn message_from_row(row: MessageRow) -> Result<ChatMessage, DatabaseError> {
    Ok(ChatMessage {
        id: parse_uuid(&row.id)?,
        channel_owner_id: parse_uuid(&row.channel_owner_id)?,
        sender_id: parse_uuid(&row.sender_id)?,
        content: row.content,
        sent_at: parse_datetime(&row.sent_at)?,
    })
}
