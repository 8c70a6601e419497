//! Slot endpoints — the booking engine and approval workflow surface.
//!
//! - `GET    /slots/available` — free, future-dated slots (any role)
//! - `POST   /slots/book` — claim a slot (any role)
//! - `POST   /slots` — publish a slot (staff)
//! - `DELETE /slots/:slot_id` — remove a free slot (staff)
//! - `GET    /slots/pending-approval` — booked slots + patient (staff)
//! - `POST   /slots/:slot_id/approve` — confirm a booking (staff)

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::approval;
use crate::booking;
use crate::identity::AuthUser;
use crate::models::{PendingSlot, Slot};

#[derive(Serialize)]
pub struct SlotsResponse {
    pub slots: Vec<Slot>,
}

/// `GET /slots/available` — free slots from now on, soonest first.
pub async fn available(
    State(ctx): State<ApiContext>,
    Extension(_auth): Extension<AuthUser>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let slots = booking::list_available(&conn, Utc::now().naive_utc())?;
    Ok(Json(SlotsResponse { slots }))
}

#[derive(Deserialize)]
pub struct BookRequest {
    pub slot_id: Uuid,
}

#[derive(Serialize)]
pub struct SlotResponse {
    pub slot: Slot,
}

/// `POST /slots/book` — atomically claim a free slot for the caller.
pub async fn book(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<BookRequest>,
) -> Result<Json<SlotResponse>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    let slot = booking::claim(&mut conn, auth.user_id, req.slot_id)?;
    Ok(Json(SlotResponse { slot }))
}

#[derive(Deserialize)]
pub struct CreateSlotRequest {
    pub date_time: DateTime<Utc>,
}

/// `POST /slots` — staff publish a new free slot.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateSlotRequest>,
) -> Result<Json<SlotResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let slot = booking::create_slot(
        &conn,
        auth.role,
        req.date_time.naive_utc(),
        Utc::now().naive_utc(),
    )?;
    Ok(Json(SlotResponse { slot }))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: Uuid,
}

/// `DELETE /slots/:slot_id` — staff remove an unbooked slot.
pub async fn delete_slot(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    booking::delete_slot(&mut conn, auth.role, slot_id)?;
    Ok(Json(DeletedResponse { deleted: slot_id }))
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub pending: Vec<PendingSlot>,
}

/// `GET /slots/pending-approval` — staff view of bookings awaiting
/// confirmation, with the owning patient's identity.
pub async fn pending_approval(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<PendingResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let pending = approval::list_pending(&conn, auth.role)?;
    Ok(Json(PendingResponse { pending }))
}

/// `POST /slots/:slot_id/approve` — staff confirm a booked slot.
pub async fn approve(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotResponse>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    let slot = approval::approve(&mut conn, auth.role, slot_id)?;
    Ok(Json(SlotResponse { slot }))
}
