//! Shared application state.
//!
//! `CoreState` is wrapped in `Arc` at startup and shared by every request
//! task. SQLite connections are opened per operation rather than pooled;
//! the live channel registry is the only in-process mutable state and sits
//! behind a short-lived lock.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::chat::ChannelRegistry;
use crate::db;

pub struct CoreState {
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    /// Live WebSocket connection → channel membership.
    channels: Mutex<ChannelRegistry>,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("State lock poisoned")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

impl CoreState {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            channels: Mutex::new(ChannelRegistry::new()),
        }
    }

    /// Open a database connection for one operation. Most handlers call
    /// this once, do their reads/writes, and drop the connection.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }

    /// Lock the channel registry. Held only for membership changes and
    /// broadcast snapshots, never across an await point.
    pub fn channels(&self) -> Result<MutexGuard<'_, ChannelRegistry>, CoreError> {
        self.channels.lock().map_err(|_| CoreError::LockPoisoned)
    }
}
