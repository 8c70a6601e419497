use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::SlotState;
use crate::models::{PendingSlot, Slot};

/// Timestamp storage format. Lexicographic order matches chronological order,
/// so SQL ORDER BY and >= comparisons on the text column are correct.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn insert_slot(conn: &Connection, slot: &Slot, now: NaiveDateTime) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO slots (id, date_time, state, patient_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            slot.id.to_string(),
            slot.date_time.format(DATETIME_FORMAT).to_string(),
            slot.state.as_str(),
            slot.patient_id.map(|id| id.to_string()),
            now.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_slot(conn: &Connection, id: &Uuid) -> Result<Option<Slot>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, date_time, state, patient_id FROM slots WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(SlotRow {
                id: row.get(0)?,
                date_time: row.get(1)?,
                state: row.get(2)?,
                patient_id: row.get(3)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(slot_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Free slots at or after `now`, soonest first.
pub fn list_available(conn: &Connection, now: NaiveDateTime) -> Result<Vec<Slot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, date_time, state, patient_id FROM slots
         WHERE state = 'free' AND date_time >= ?1
         ORDER BY date_time ASC",
    )?;

    let rows = stmt.query_map(params![now.format(DATETIME_FORMAT).to_string()], |row| {
        Ok(SlotRow {
            id: row.get(0)?,
            date_time: row.get(1)?,
            state: row.get(2)?,
            patient_id: row.get(3)?,
        })
    })?;

    let mut slots = Vec::new();
    for row in rows {
        slots.push(slot_from_row(row?)?);
    }
    Ok(slots)
}

/// The patient's booked-or-confirmed slot, if any. At most one exists.
pub fn find_active_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<Slot>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, date_time, state, patient_id FROM slots
         WHERE patient_id = ?1 AND state IN ('booked', 'confirmed')",
        params![patient_id.to_string()],
        |row| {
            Ok(SlotRow {
                id: row.get(0)?,
                date_time: row.get(1)?,
                state: row.get(2)?,
                patient_id: row.get(3)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(slot_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Conditional claim: flips the slot to booked only if it is still free.
/// Returns the number of rows updated (0 means the slot was taken or absent).
pub fn claim_if_free(
    conn: &Connection,
    slot_id: &Uuid,
    patient_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE slots SET state = 'booked', patient_id = ?1
         WHERE id = ?2 AND state = 'free'",
        params![patient_id.to_string(), slot_id.to_string()],
    )?;
    Ok(updated)
}

/// Conditional confirm: booked → confirmed. Returns rows updated.
pub fn confirm_if_booked(conn: &Connection, slot_id: &Uuid) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE slots SET state = 'confirmed' WHERE id = ?1 AND state = 'booked'",
        params![slot_id.to_string()],
    )?;
    Ok(updated)
}

pub fn delete_slot(conn: &Connection, slot_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM slots WHERE id = ?1",
        params![slot_id.to_string()],
    )?;
    Ok(deleted)
}

/// Booked slots awaiting confirmation, joined with the owning patient's
/// display identity, soonest first.
pub fn list_pending(conn: &Connection) -> Result<Vec<PendingSlot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.date_time, s.patient_id, u.email, u.first_name, u.last_name
         FROM slots s JOIN users u ON u.id = s.patient_id
         WHERE s.state = 'booked'
         ORDER BY s.date_time ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(PendingRow {
            id: row.get(0)?,
            date_time: row.get(1)?,
            patient_id: row.get(2)?,
            patient_email: row.get(3)?,
            patient_first_name: row.get(4)?,
            patient_last_name: row.get(5)?,
        })
    })?;

    let mut pending = Vec::new();
    for row in rows {
        pending.push(pending_from_row(row?)?);
    }
    Ok(pending)
}

struct SlotRow {
    id: String,
    date_time: String,
    state: String,
    patient_id: Option<String>,
}

struct PendingRow {
    id: String,
    date_time: String,
    patient_id: String,
    patient_email: String,
    patient_first_name: Option<String>,
    patient_last_name: Option<String>,
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn slot_from_row(row: SlotRow) -> Result<Slot, DatabaseError> {
    Ok(Slot {
        id: parse_uuid(&row.id)?,
        date_time: parse_datetime(&row.date_time)?,
        state: SlotState::from_str(&row.state)?,
        patient_id: row.patient_id.as_deref().map(parse_uuid).transpose()?,
    })
}

fn pending_from_row(row: PendingRow) -> Result<PendingSlot, DatabaseError> {
    Ok(PendingSlot {
        id: parse_uuid(&row.id)?,
        date_time: parse_datetime(&row.date_time)?,
        patient_id: parse_uuid(&row.patient_id)?,
        patient_email: row.patient_email,
        patient_first_name: row.patient_first_name,
        patient_last_name: row.patient_last_name,
    })
}
