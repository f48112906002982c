//! Database layer for the clinic core.

mod schema;
mod calendar;
mod snapshots;
mod files;
mod submissions;
mod appointments;
mod forms;
mod staff;

pub use schema::*;
pub use files::hash_content;

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database is busy")]
    Busy,

    #[error("Connection lock poisoned: {0}")]
    Poisoned(String),
}

impl DbError {
    /// Lock contention from another writer.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Busy => true,
            DbError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }

    /// UNIQUE or PRIMARY KEY violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Duplicate(_) => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open database at path; writers wait up to `busy_timeout` for a lock.
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `PRAGMA data_version`: changes whenever another connection commits
    /// to the same database file.
    pub fn data_version(&self) -> DbResult<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    /// True while a transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so every read inside `f` observes
    /// the state it will commit against. Returning `Err` rolls everything
    /// back. Calls made while a transaction is already open join it.
    pub fn immediate<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Database) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.in_transaction() {
            return f(self);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let value = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";

pub(crate) fn date_to_string(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn string_to_date(s: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| DbError::Constraint(format!("Invalid date: {}", s)))
}

pub(crate) fn time_to_string(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn string_to_time(s: &str) -> DbResult<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|_| DbError::Constraint(format!("Invalid time: {}", s)))
}

pub(crate) fn opt_date(s: Option<String>) -> DbResult<Option<NaiveDate>> {
    s.as_deref().map(string_to_date).transpose()
}

pub(crate) fn opt_time(s: Option<String>) -> DbResult<Option<NaiveTime>> {
    s.as_deref().map(string_to_time).transpose()
}
