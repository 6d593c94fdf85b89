use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;

use crate::db::init_db;
use crate::error::Result;

/// SQLite-backed owner source and send ledger.
///
/// One connection behind a `Mutex`; every operation is a short statement so
/// workers contend only briefly.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) a database file with WAL journaling.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        debug!(path = %path.display(), "store opened");
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().expect("store connection poisoned")
    }
}
