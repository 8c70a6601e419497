use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SlotState;

/// One bookable unit of time published by staff.
///
/// `patient_id` is set exactly when the slot is booked or confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub date_time: NaiveDateTime,
    pub state: SlotState,
    pub patient_id: Option<Uuid>,
}

/// A booked slot awaiting staff confirmation, joined with the owning
/// patient's display identity for the approval screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSlot {
    pub id: Uuid,
    pub date_time: NaiveDateTime,
    pub patient_id: Uuid,
    pub patient_email: String,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
}
