//! Booking engine — the slot lifecycle up to the staff approval step.
//!
//! All slot mutation flows through this module and `approval`; nothing else
//! writes slot state. `claim` is the concurrency-sensitive operation: the
//! check-then-set runs inside a single `BEGIN IMMEDIATE` transaction, so
//! SQLite's writer lock serializes competing claims and exactly one caller
//! can observe a slot as free and take it.

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::slot;
use crate::db::DatabaseError;
use crate::models::enums::{Role, SlotState};
use crate::models::Slot;

#[derive(Debug, Error)]
pub enum BookingError {
    /// The patient already holds a booked or confirmed slot.
    #[error("patient already has an active booking")]
    AlreadyBooked,
    /// The target slot is absent or no longer free.
    #[error("slot unavailable")]
    SlotUnavailable,
    /// Delete refused because the slot is booked or confirmed.
    #[error("slot reserved")]
    SlotReserved,
    #[error("slot not found")]
    NotFound,
    #[error("staff role required")]
    Unauthorized,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Free slots at or after `now`, soonest first. Read-only.
pub fn list_available(
    conn: &Connection,
    now: NaiveDateTime,
) -> Result<Vec<Slot>, BookingError> {
    Ok(slot::list_available(conn, now)?)
}

/// Staff publish a new free slot. Duplicate date_times are permitted.
pub fn create_slot(
    conn: &Connection,
    role: Role,
    date_time: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<Slot, BookingError> {
    if role != Role::Staff {
        return Err(BookingError::Unauthorized);
    }

    let new_slot = Slot {
        id: Uuid::new_v4(),
        date_time,
        state: SlotState::Free,
        patient_id: None,
    };
    slot::insert_slot(conn, &new_slot, now)?;

    tracing::info!(slot_id = %new_slot.id, date_time = %date_time, "Slot created");
    Ok(new_slot)
}

/// Claim a free slot for a patient.
///
/// Both guards run inside one immediate transaction:
/// 1. the patient must not already hold an active slot;
/// 2. the conditional update flips the slot to booked only while it is
///    still free — zero rows updated means someone else won or the slot
///    never existed, and both cases surface as `SlotUnavailable`.
pub fn claim(
    conn: &mut Connection,
    patient_id: Uuid,
    slot_id: Uuid,
) -> Result<Slot, BookingError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;

    if slot::find_active_for_patient(&tx, &patient_id)?.is_some() {
        return Err(BookingError::AlreadyBooked);
    }

    if slot::claim_if_free(&tx, &slot_id, &patient_id)? == 0 {
        return Err(BookingError::SlotUnavailable);
    }

    let claimed = slot::get_slot(&tx, &slot_id)?.ok_or(BookingError::SlotUnavailable)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(slot_id = %slot_id, patient_id = %patient_id, "Slot booked");
    Ok(claimed)
}

/// Staff delete an unbooked slot. Booked and confirmed slots are never
/// deleted — there is no cancel transition in this lifecycle.
pub fn delete_slot(
    conn: &mut Connection,
    role: Role,
    slot_id: Uuid,
) -> Result<(), BookingError> {
    if role != Role::Staff {
        return Err(BookingError::Unauthorized);
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;

    let existing = slot::get_slot(&tx, &slot_id)?.ok_or(BookingError::NotFound)?;
    if existing.state != SlotState::Free {
        return Err(BookingError::SlotReserved);
    }

    slot::delete_slot(&tx, &slot_id)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(slot_id = %slot_id, "Slot deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::db::repository::user;
    use crate::db::sqlite::{open_database, open_memory_database};
    use crate::models::User;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 9, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn insert_patient(conn: &Connection, email: &str) -> Uuid {
        let patient = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "x".to_string(),
            role: Role::Patient,
            first_name: None,
            last_name: None,
            created_at: dt(1, 0),
        };
        user::insert_user(conn, &patient).unwrap();
        patient.id
    }

    fn staff_slot(conn: &Connection, date_time: NaiveDateTime) -> Slot {
        create_slot(conn, Role::Staff, date_time, dt(1, 0)).unwrap()
    }

    #[test]
    fn create_requires_staff() {
        let conn = open_memory_database().unwrap();
        let result = create_slot(&conn, Role::Patient, dt(2, 10), dt(1, 0));
        assert!(matches!(result, Err(BookingError::Unauthorized)));
    }

    #[test]
    fn duplicate_date_times_are_permitted() {
        let conn = open_memory_database().unwrap();
        staff_slot(&conn, dt(2, 10));
        staff_slot(&conn, dt(2, 10));
        assert_eq!(list_available(&conn, dt(1, 0)).unwrap().len(), 2);
    }

    #[test]
    fn list_available_excludes_past_and_sorts_ascending() {
        let conn = open_memory_database().unwrap();
        staff_slot(&conn, dt(5, 9));
        staff_slot(&conn, dt(2, 9));
        staff_slot(&conn, dt(3, 9));

        let available = list_available(&conn, dt(3, 0)).unwrap();
        let times: Vec<_> = available.iter().map(|s| s.date_time).collect();
        assert_eq!(times, vec![dt(3, 9), dt(5, 9)]);
    }

    #[test]
    fn claim_books_free_slot() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = insert_patient(&conn, "a@clinic.test");
        let created = staff_slot(&conn, dt(2, 10));

        let booked = claim(&mut conn, patient_id, created.id).unwrap();
        assert_eq!(booked.state, SlotState::Booked);
        assert_eq!(booked.patient_id, Some(patient_id));

        // No longer listed as available
        assert!(list_available(&conn, dt(1, 0)).unwrap().is_empty());
    }

    #[test]
    fn claim_of_taken_slot_conflicts() {
        let mut conn = open_memory_database().unwrap();
        let first = insert_patient(&conn, "a@clinic.test");
        let second = insert_patient(&conn, "b@clinic.test");
        let created = staff_slot(&conn, dt(2, 10));

        claim(&mut conn, first, created.id).unwrap();
        let result = claim(&mut conn, second, created.id);
        assert!(matches!(result, Err(BookingError::SlotUnavailable)));

        // Loser did not disturb the winner's booking
        let slot = slot::get_slot(&conn, &created.id).unwrap().unwrap();
        assert_eq!(slot.patient_id, Some(first));
    }

    #[test]
    fn claim_of_missing_slot_conflicts() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = insert_patient(&conn, "a@clinic.test");
        let result = claim(&mut conn, patient_id, Uuid::new_v4());
        assert!(matches!(result, Err(BookingError::SlotUnavailable)));
    }

    #[test]
    fn one_active_booking_per_patient() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = insert_patient(&conn, "a@clinic.test");
        let first = staff_slot(&conn, dt(2, 10));
        let second = staff_slot(&conn, dt(3, 10));

        claim(&mut conn, patient_id, first.id).unwrap();
        let result = claim(&mut conn, patient_id, second.id);
        assert!(matches!(result, Err(BookingError::AlreadyBooked)));

        // The second slot stays free for others
        let slot = slot::get_slot(&conn, &second.id).unwrap().unwrap();
        assert_eq!(slot.state, SlotState::Free);
    }

    #[test]
    fn delete_requires_staff() {
        let mut conn = open_memory_database().unwrap();
        let created = staff_slot(&conn, dt(2, 10));
        let result = delete_slot(&mut conn, Role::Patient, created.id);
        assert!(matches!(result, Err(BookingError::Unauthorized)));
    }

    #[test]
    fn delete_of_missing_slot_is_not_found() {
        let mut conn = open_memory_database().unwrap();
        let result = delete_slot(&mut conn, Role::Staff, Uuid::new_v4());
        assert!(matches!(result, Err(BookingError::NotFound)));
    }

    #[test]
    fn delete_of_booked_slot_conflicts() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = insert_patient(&conn, "a@clinic.test");
        let created = staff_slot(&conn, dt(2, 10));
        claim(&mut conn, patient_id, created.id).unwrap();

        let result = delete_slot(&mut conn, Role::Staff, created.id);
        assert!(matches!(result, Err(BookingError::SlotReserved)));
    }

    #[test]
    fn delete_of_free_slot_succeeds() {
        let mut conn = open_memory_database().unwrap();
        let created = staff_slot(&conn, dt(2, 10));
        delete_slot(&mut conn, Role::Staff, created.id).unwrap();
        assert!(slot::get_slot(&conn, &created.id).unwrap().is_none());
    }

    /// The exclusivity property: N threads race for one slot through
    /// separate connections to the same database file; exactly one wins.
    #[test]
    fn concurrent_claims_have_single_winner() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("race.db");

        let conn = open_database(&path).unwrap();
        let created = staff_slot(&conn, dt(2, 10));
        let patients: Vec<Uuid> = (0..8)
            .map(|i| insert_patient(&conn, &format!("p{i}@clinic.test")))
            .collect();
        drop(conn);

        let handles: Vec<_> = patients
            .into_iter()
            .map(|patient_id| {
                let path = path.clone();
                let slot_id = created.id;
                std::thread::spawn(move || {
                    let mut conn = open_database(&path).unwrap();
                    claim(&mut conn, patient_id, slot_id).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(winners, 1, "exactly one concurrent claim may succeed");

        let conn = open_database(&path).unwrap();
        let final_slot = slot::get_slot(&conn, &created.id).unwrap().unwrap();
        assert_eq!(final_slot.state, SlotState::Booked);
        assert!(final_slot.patient_id.is_some());
    }
}
