//! Account endpoints.
//!
//! - `POST /auth/register` — create a patient account
//! - `POST /auth/login` — check credentials, issue a bearer token

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::identity::{self, NewUser};
use crate::models::UserPublic;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: UserPublic,
}

/// `POST /auth/register` — new accounts are always patients.
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let created = identity::register(
        &conn,
        NewUser {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        },
        Utc::now().naive_utc(),
    )?;

    Ok(Json(RegisterResponse {
        user: created.into(),
    }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserPublic,
}

/// `POST /auth/login` — issue a fresh opaque bearer token.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (token, account) =
        identity::login(&conn, &req.email, &req.password, Utc::now().naive_utc())?;

    Ok(Json(LoginResponse {
        access_token: token,
        user: account.into(),
    }))
}
