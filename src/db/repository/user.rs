use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::repository::slot::{parse_datetime, parse_uuid, DATETIME_FORMAT};
use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::User;

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, password_hash, role, first_name, last_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.to_string(),
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.first_name,
            user.last_name,
            user.created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    query_one(
        conn,
        "SELECT id, email, password_hash, role, first_name, last_name, created_at
         FROM users WHERE email = ?1",
        params![email],
    )
}

pub fn find_by_id(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    query_one(
        conn,
        "SELECT id, email, password_hash, role, first_name, last_name, created_at
         FROM users WHERE id = ?1",
        params![id.to_string()],
    )
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<User>, DatabaseError> {
    let result = conn.query_row(sql, params, |row| {
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            role: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            created_at: row.get(6)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(user_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    role: String,
    first_name: Option<String>,
    last_name: Option<String>,
    created_at: String,
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id)?,
        email: row.email,
        password_hash: row.password_hash,
        role: Role::from_str(&row.role)?,
        first_name: row.first_name,
        last_name: row.last_name,
        created_at: parse_datetime(&row.created_at)?,
    })
}
