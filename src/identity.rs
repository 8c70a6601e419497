//! Identity verifier — the narrow interface every other component consumes:
//! `verify(token) → AuthUser { user_id, role }`.
//!
//! Tokens are opaque: 32 random bytes, URL-safe base64 on the wire, stored
//! as SHA-256 hashes. Passwords are PBKDF2-HMAC-SHA256 with a per-user salt
//! and compared in constant time.

use std::str::FromStr;

use base64::Engine;
use chrono::NaiveDateTime;
use pbkdf2::pbkdf2_hmac;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::slot::DATETIME_FORMAT;
use crate::db::repository::user;
use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::User;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Verified caller identity, passed explicitly into every component call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// New-account request. Role is always patient; staff accounts are
/// bootstrapped via [`ensure_staff_account`].
#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// ── Token + password primitives ─────────────────────────────

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a bearer token for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Derive a salted password hash, encoded as `salt$hash` (both base64).
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LENGTH] = rand::random();
    let mut derived = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut derived);

    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!("{}${}", b64.encode(salt), b64.encode(derived))
}

/// Constant-time check of a password against a stored `salt$hash` value.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let Some((salt_b64, hash_b64)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (b64.decode(salt_b64), b64.decode(hash_b64)) else {
        return false;
    };

    let mut derived = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut derived);
    derived.ct_eq(expected.as_slice()).into()
}

// ── Operations ──────────────────────────────────────────────

/// Resolve a presented bearer token to its user. This is the whole
/// authentication surface the rest of the system sees.
pub fn verify(conn: &Connection, token: &str) -> Result<AuthUser, IdentityError> {
    let result = conn.query_row(
        "SELECT u.id, u.role FROM auth_tokens t
         JOIN users u ON u.id = t.user_id
         WHERE t.token_hash = ?1",
        params![hash_token(token)],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );

    let (id, role) = match result {
        Ok(pair) => pair,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(IdentityError::InvalidToken),
        Err(e) => return Err(DatabaseError::from(e).into()),
    };

    Ok(AuthUser {
        user_id: Uuid::parse_str(&id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        role: Role::from_str(&role).map_err(IdentityError::Database)?,
    })
}

/// Create a patient account.
pub fn register(
    conn: &Connection,
    new_user: NewUser,
    now: NaiveDateTime,
) -> Result<User, IdentityError> {
    let email = new_user.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(IdentityError::Validation("invalid email address".into()));
    }
    if new_user.password.len() < MIN_PASSWORD_LENGTH {
        return Err(IdentityError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if user::find_by_email(conn, &email)?.is_some() {
        return Err(IdentityError::EmailTaken);
    }

    let created = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&new_user.password),
        role: Role::Patient,
        first_name: new_user.first_name,
        last_name: new_user.last_name,
        created_at: now,
    };
    user::insert_user(conn, &created)?;

    tracing::info!(user_id = %created.id, "Patient registered");
    Ok(created)
}

/// Check credentials and issue a fresh bearer token.
pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    now: NaiveDateTime,
) -> Result<(String, User), IdentityError> {
    let account = user::find_by_email(conn, &email.trim().to_lowercase())?
        .ok_or(IdentityError::InvalidCredentials)?;

    if !verify_password(password, &account.password_hash) {
        return Err(IdentityError::InvalidCredentials);
    }

    let token = generate_token();
    conn.execute(
        "INSERT INTO auth_tokens (token_hash, user_id, issued_at) VALUES (?1, ?2, ?3)",
        params![
            hash_token(&token),
            account.id.to_string(),
            now.format(DATETIME_FORMAT).to_string(),
        ],
    )
    .map_err(DatabaseError::from)?;

    tracing::info!(user_id = %account.id, role = account.role.as_str(), "Login");
    Ok((token, account))
}

/// Bootstrap helper: create the staff account if the email is unclaimed.
/// Called from startup with operator-provided credentials.
pub fn ensure_staff_account(
    conn: &Connection,
    email: &str,
    password: &str,
    now: NaiveDateTime,
) -> Result<Uuid, IdentityError> {
    let email = email.trim().to_lowercase();
    if let Some(existing) = user::find_by_email(conn, &email)? {
        return Ok(existing.id);
    }

    let staff = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(password),
        role: Role::Staff,
        first_name: None,
        last_name: None,
        created_at: now,
    };
    user::insert_user(conn, &staff)?;

    tracing::info!(user_id = %staff.id, "Staff account created");
    Ok(staff.id)
}
