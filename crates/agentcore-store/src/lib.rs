//! Shared SQLite-backed persistence layer.
//!
//! A single `Store` wraps one `rusqlite::Connection` behind a
//! `tokio::sync::Mutex`, following the `SqliteJobStore` pattern used
//! elsewhere in this workspace for embedded, zero-config persistence.
//! Per-entity repositories (sessions, messages, tool executions,
//! confirmations, policy decisions, memories) are implemented as additional
//! `impl Store` blocks in sibling modules so each maps 1:1 to a spec.md §3
//! entity.

mod confirmations;
mod memories;
mod messages;
mod policy_decisions;
mod schema;
mod sessions;
mod tool_calls;
mod tool_executions;
mod users;
mod util;

pub use confirmations::*;
pub use memories::*;
pub use messages::*;
pub use policy_decisions::*;
pub use sessions::*;
pub use tool_calls::*;
pub use tool_executions::*;
pub use users::*;

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if is_unique_violation(&e) {
            StoreError::UniqueViolation(e.to_string())
        } else {
            StoreError::Sqlite(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// The system of record. All state mutations happen through this handle;
/// idempotency and uniqueness invariants (spec.md §8 invariants 2-4) are
/// enforced by SQLite unique indexes, not application logic.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Sqlite(format!("create dir: {e}")))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init(&conn)?;
        tracing::info!(path = %path.display(), "opened store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}
