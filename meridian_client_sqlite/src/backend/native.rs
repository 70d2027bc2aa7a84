//! The file-backed synchronous engine.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Row};

use super::{Backend, SqlParams};
use crate::error::StoreError;

/// SQLite over a file on disk.
///
/// Opened in WAL mode with foreign keys enforced and a busy timeout so a
/// reader in another process does not fail writes immediately. Concurrent
/// writers against the same store handle are not supported; serialization
/// of deltas is the caller's responsibility.
pub struct NativeBackend {
    conn: Connection,
}

impl NativeBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(NativeBackend { conn })
    }
}

impl Backend for NativeBackend {
    fn run(&self, sql: &str, params: SqlParams<'_>) -> Result<usize, StoreError> {
        super::run(&self.conn, sql, params)
    }

    fn all<T, F>(&self, sql: &str, params: SqlParams<'_>, f: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        super::all(&self.conn, sql, params, f)
    }

    fn get<T, F>(&self, sql: &str, params: SqlParams<'_>, f: F) -> Result<Option<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        super::get(&self.conn, sql, params, f)
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    {
        super::transaction(&mut self.conn, f)
    }
}
