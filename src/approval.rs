//! Approval workflow — the staff-only booked → confirmed transition.
//!
//! Re-approving an already-confirmed slot is a conflict, not a no-op:
//! a double click or a racing second operator should be told, not masked.

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::slot;
use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::{PendingSlot, Slot};

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("slot not found")]
    NotFound,
    /// The slot exists but is not in the booked state (still free, or
    /// already confirmed).
    #[error("slot is not awaiting approval")]
    NotBooked,
    #[error("staff role required")]
    Unauthorized,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Booked slots awaiting confirmation, with the owning patient's display
/// identity, soonest first.
pub fn list_pending(conn: &Connection, role: Role) -> Result<Vec<PendingSlot>, ApprovalError> {
    if role != Role::Staff {
        return Err(ApprovalError::Unauthorized);
    }
    Ok(slot::list_pending(conn)?)
}

/// Confirm a booked slot. The conditional update only fires while the slot
/// is exactly in the booked state, so concurrent approvals cannot both
/// succeed — the loser gets `NotBooked`.
pub fn approve(
    conn: &mut Connection,
    role: Role,
    slot_id: Uuid,
) -> Result<Slot, ApprovalError> {
    if role != Role::Staff {
        return Err(ApprovalError::Unauthorized);
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;

    if slot::get_slot(&tx, &slot_id)?.is_none() {
        return Err(ApprovalError::NotFound);
    }

    if slot::confirm_if_booked(&tx, &slot_id)? == 0 {
        return Err(ApprovalError::NotBooked);
    }

    let confirmed = slot::get_slot(&tx, &slot_id)?.ok_or(ApprovalError::NotFound)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(slot_id = %slot_id, "Slot confirmed");
    Ok(confirmed)
}
