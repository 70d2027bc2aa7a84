//! The embedded in-memory engine.

use rusqlite::{Connection, Row};

use super::{Backend, SqlParams};
use crate::error::StoreError;

/// SQLite over an in-memory database.
///
/// Serves environments without a durable filesystem, where the store
/// lives for the duration of the session. Access is single-threaded
/// cooperative: there are never concurrent readers or writers against a
/// handle. The schema is identical to [`NativeBackend`]'s, so snapshots
/// moved between the engines remain readable.
///
/// [`NativeBackend`]: super::NativeBackend
pub struct MemoryBackend {
    conn: Connection,
}

impl MemoryBackend {
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(MemoryBackend { conn })
    }
}

impl Backend for MemoryBackend {
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
