use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only chat record. `channel_owner_id` is the patient whose channel
/// the message belongs to; `sender_id` is who wrote it (patient or staff).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub channel_owner_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: NaiveDateTime,
}
