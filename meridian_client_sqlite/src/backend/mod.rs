//! The engine-agnostic backend adapter.
//!
//! Record stores and the synchronization applier are written once against
//! [`Backend`]. The two physical engines behind it delegate to a single
//! set of helpers over a [`rusqlite::Connection`] and create the same
//! table layout, so a store file produced by one engine is openable by
//! the other and their behavior cannot drift apart.

use rusqlite::{OptionalExtension, Row, ToSql};

use crate::error::StoreError;

mod memory;
mod native;

pub use memory::MemoryBackend;
pub use native::NativeBackend;

/// Named parameters for a single SQL statement.
pub type SqlParams<'a> = &'a [(&'a str, &'a dyn ToSql)];

/// An empty parameter list.
pub const NO_PARAMS: SqlParams<'static> = &[];

/// The minimal capability surface a physical storage engine must provide.
pub trait Backend {
    /// Executes a single statement, returning the number of rows changed.
    fn run(&self, sql: &str, params: SqlParams<'_>) -> Result<usize, StoreError>;

    /// Runs a query, mapping every result row through `f`.
    fn all<T, F>(&self, sql: &str, params: SqlParams<'_>, f: F) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>;

    /// Runs a query expected to produce at most one row.
    fn get<T, F>(&self, sql: &str, params: SqlParams<'_>, f: F) -> Result<Option<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>;

    /// Runs `f` inside an immediate transaction, committing on `Ok` and
    /// rolling back on `Err`.
    ///
    /// Taking `&mut self` makes reentrant transactions unrepresentable.
    fn transaction<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>;
}

pub(crate) fn run(
    conn: &rusqlite::Connection,
    sql: &str,
    params: SqlParams<'_>,
) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(params)?)
}

pub(crate) fn all<T, F>(
    conn: &rusqlite::Connection,
    sql: &str,
    params: SqlParams<'_>,
    f: F,
) -> Result<Vec<T>, StoreError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, f)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(StoreError::from)
}

pub(crate) fn get<T, F>(
    conn: &rusqlite::Connection,
    sql: &str,
    params: SqlParams<'_>,
    f: F,
) -> Result<Option<T>, StoreError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare_cached(sql)?;
    stmt.query_row(params, f)
        .optional()
        .map_err(StoreError::from)
}

pub(crate) fn transaction<T, F>(conn: &mut rusqlite::Connection, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
{
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use rusqlite::named_params;

    use super::{Backend, MemoryBackend, NO_PARAMS};
    use crate::error::StoreError;

    fn scratch_backend() -> MemoryBackend {
        let backend = MemoryBackend::open().unwrap();
        backend
            .run("CREATE TABLE t (k TEXT PRIMARY KEY, v INTEGER)", NO_PARAMS)
            .unwrap();
        backend
    }

    #[test]
    fn get_distinguishes_absence_from_failure() {
        let backend = scratch_backend();
        let absent = backend
            .get("SELECT v FROM t WHERE k = :k", named_params![":k": "a"], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap();
        assert_eq!(absent, None);

        let failed = backend.get("SELECT v FROM missing", NO_PARAMS, |row| {
            row.get::<_, i64>(0)
        });
        assert!(failed.is_err());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let mut backend = scratch_backend();
        let result: Result<(), StoreError> = backend.transaction(|tx| {
            tx.execute("INSERT INTO t (k, v) VALUES ('a', 1)", [])?;
            Err(StoreError::CorruptedData("boom".into()))
        });
        assert!(result.is_err());

        let count = backend
            .get("SELECT COUNT(*) FROM t", NO_PARAMS, |row| {
                row.get::<_, i64>(0)
            })
            .unwrap();
        assert_eq!(count, Some(0));
    }
}
