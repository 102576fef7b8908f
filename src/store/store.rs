//! Store handle and connection management

use super::schema;
use crate::error::{StorageError, WardenError, WardenResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Embedded time-series store backing the whole agent.
///
/// A single connection in WAL mode, shared behind a mutex; every loop in the
/// process talks to the same handle and SQLite serializes the writes.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) and migrate the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(StorageError::Io)?;
            }
        }

        let conn = Connection::open(&path).map_err(|e| {
            WardenError::Storage(StorageError::ConnectionFailed(format!(
                "failed to open db: {e}"
            )))
        })?;

        Self::configure_connection(&conn)?;
        schema::create_tables(&conn)?;
        schema::migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests
    pub fn in_memory() -> WardenResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            WardenError::Storage(StorageError::ConnectionFailed(format!(
                "failed to open db: {e}"
            )))
        })?;
        Self::configure_connection(&conn)?;
        schema::create_tables(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // Foreign keys stay off: snapshot ingest for a not-yet-discovered disk
    // id must succeed, the declarations are documentation only
    fn configure_connection(conn: &Connection) -> WardenResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        Ok(())
    }

    /// Get the locked connection for internal operations
    pub(crate) fn get_conn(&self) -> WardenResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            WardenError::Storage(StorageError::ConnectionFailed("lock poisoned".into()))
        })
    }
}
