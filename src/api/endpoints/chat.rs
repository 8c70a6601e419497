//! Chat endpoints.
//!
//! - `GET /chat/history/:patient_id` — channel history (patients are
//!   always answered with their own channel)
//! - `GET /chat/patients` — staff roster with latest booking status

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::chat::{self, RosterEntry};
use crate::identity::AuthUser;
use crate::models::ChatMessage;

#[derive(Serialize)]
pub struct HistoryResponse {
    pub channel_owner_id: Uuid,
    pub messages: Vec<ChatMessage>,
}

/// `GET /chat/history/:patient_id` — ordered channel history.
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let messages = chat::history(&conn, &auth, patient_id)?;
    let channel_owner_id = chat::resolve_channel_owner(&auth, Some(patient_id));

    Ok(Json(HistoryResponse {
        channel_owner_id,
        messages,
    }))
}

#[derive(Serialize)]
pub struct PatientsResponse {
    pub patients: Vec<RosterEntry>,
}

/// `GET /chat/patients` — staff sidebar roster.
pub async fn patients(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<PatientsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let patients = chat::patient_roster(&conn, auth.role)?;
    Ok(Json(PatientsResponse { patients }))
}
