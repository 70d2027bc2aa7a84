//! Keyed client settings.
//!
//! One reserved key holds the client version used for compatibility
//! enforcement; it is hidden from listing and cannot be removed through
//! the public surface.

use rusqlite::{named_params, Connection, OptionalExtension};

use crate::backend::Backend;
use crate::error::StoreError;

/// Reserved settings key holding the schema/client version.
pub(crate) const CLIENT_VERSION_KEY: &str = "client_version";

const SELECT_SETTING: &str = "SELECT value FROM settings WHERE name = :name";

pub(crate) fn put_setting(conn: &Connection, name: &str, value: &str) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO settings (name, value) VALUES (:name, :value)
         ON CONFLICT (name) DO UPDATE SET value = :value",
    )?;
    stmt.execute(named_params![":name": name, ":value": value])?;
    Ok(())
}

pub(crate) fn get_setting(conn: &Connection, name: &str) -> Result<Option<String>, StoreError> {
    let mut stmt = conn.prepare_cached(SELECT_SETTING)?;
    stmt.query_row(named_params![":name": name], |row| row.get(0))
        .optional()
        .map_err(StoreError::from)
}

pub(crate) fn remove_setting(conn: &Connection, name: &str) -> Result<usize, StoreError> {
    if name == CLIENT_VERSION_KEY {
        return Err(StoreError::ConstraintViolation(
            "the client version setting is managed by the store".into(),
        ));
    }
    let mut stmt = conn.prepare_cached("DELETE FROM settings WHERE name = :name")?;
    Ok(stmt.execute(named_params![":name": name])?)
}

pub(crate) fn fetch_setting<B: Backend>(
    backend: &B,
    name: &str,
) -> Result<Option<String>, StoreError> {
    backend.get(SELECT_SETTING, named_params![":name": name], |row| {
        row.get(0)
    })
}

/// Every setting except the reserved client-version key.
pub(crate) fn list_settings<B: Backend>(backend: &B) -> Result<Vec<(String, String)>, StoreError> {
    backend.all(
        "SELECT name, value FROM settings WHERE name <> :reserved ORDER BY name",
        named_params![":reserved": CLIENT_VERSION_KEY],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::CLIENT_VERSION_KEY;
    use crate::error::StoreError;
    use crate::testing::memory_store;

    #[test]
    fn reserved_key_is_hidden_and_protected() {
        let mut store = memory_store();
        store.set_setting("rpc_endpoint", "https://node.meridian.dev").unwrap();

        let listed = store.list_settings().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "rpc_endpoint");

        assert_matches!(
            store.remove_setting(CLIENT_VERSION_KEY),
            Err(StoreError::ConstraintViolation(_))
        );
        // The reserved key is still readable directly.
        assert!(store.get_setting(CLIENT_VERSION_KEY).unwrap().is_some());
    }

    #[test]
    fn settings_round_trip_and_remove() {
        let mut store = memory_store();
        store.set_setting("alias", "main-wallet").unwrap();
        store.set_setting("alias", "cold-wallet").unwrap();
        assert_eq!(
            store.get_setting("alias").unwrap().as_deref(),
            Some("cold-wallet")
        );
        assert_eq!(store.remove_setting("alias").unwrap(), 1);
        assert_eq!(store.get_setting("alias").unwrap(), None);
    }
}
