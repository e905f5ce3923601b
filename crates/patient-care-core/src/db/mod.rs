//! Database layer for the patient care store.

mod schema;
mod medicines;
mod patients;
mod resequence;

pub use schema::*;
pub use resequence::*;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Resequencing aborted: {0}")]
    Resequence(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Row counts for both tables.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordCounts {
    pub patients: u32,
    pub medicines: u32,
}

/// Owned handle to the store connection.
///
/// The handle remembers the file it was opened from so that a restore can close
/// the connection, swap the file, and reopen through the same handle.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        let db = Self {
            conn,
            path: Some(path),
        };
        db.initialize()?;
        tracing::debug!(path = ?db.path, "Store opened");
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema. Also re-enables foreign keys, which are per-connection.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Close the file-backed connection, leaving a detached in-memory one in its place.
    ///
    /// Until [`Database::reopen`] succeeds every query runs against an empty scratch store.
    pub fn close(&mut self) -> DbResult<()> {
        let detached = std::mem::replace(&mut self.conn, Connection::open_in_memory()?);
        if let Err((conn, e)) = detached.close() {
            self.conn = conn;
            return Err(e.into());
        }
        tracing::debug!(path = ?self.path, "Store closed");
        Ok(())
    }

    /// Reopen the connection on the backing file.
    pub fn reopen(&mut self) -> DbResult<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| DbError::NotFound("store file (in-memory database)".into()))?;
        self.conn = Connection::open(&path)?;
        self.initialize()?;
        tracing::debug!(path = ?path, "Store reopened");
        Ok(())
    }

    /// Count rows in both tables.
    pub fn counts(&self) -> DbResult<RecordCounts> {
        let patients: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        let medicines: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM medicines", [], |row| row.get(0))?;
        Ok(RecordCounts {
            patients,
            medicines,
        })
    }
}
