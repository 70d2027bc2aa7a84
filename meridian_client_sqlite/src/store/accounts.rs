//! Account snapshots, their component tables, and tracking metadata.

use std::collections::BTreeMap;

use rusqlite::{named_params, Connection};

use crate::backend::{Backend, NO_PARAMS};
use crate::error::StoreError;
use crate::model::account::{
    AccountCode, AccountHeader, AccountRecord, AccountSnapshot, AccountStatus, AssetEntry,
    StorageMapEntry, StorageSlot, StorageSlotType,
};
use crate::model::{AccountId, Digest, Word};

const ACCOUNT_COLUMNS: &str = "id, account_commitment, code_commitment, storage_commitment, vault_root, nonce, account_seed, locked";

type RawAccountRow = (AccountHeader, Option<Word>, bool);

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAccountRow> {
    let header = AccountHeader {
        id: row.get(0)?,
        commitment: row.get(1)?,
        code_commitment: row.get(2)?,
        storage_commitment: row.get(3)?,
        vault_root: row.get(4)?,
        nonce: row.get(5)?,
    };
    Ok((header, row.get(6)?, row.get(7)?))
}

fn status_for(
    header: &AccountHeader,
    seed: Option<Word>,
    locked: bool,
) -> Result<AccountStatus, StoreError> {
    if locked {
        return Ok(AccountStatus::Locked);
    }
    if header.nonce == 0 {
        return seed.map(|seed| AccountStatus::New { seed }).ok_or_else(|| {
            StoreError::CorruptedData(format!(
                "account {} is at nonce zero without a stored seed",
                header.id
            ))
        });
    }
    Ok(AccountStatus::Tracked)
}

// WRITES
// ================================================================================================

/// Writes a complete account state: code, storage slots, storage-map
/// entries, vault assets, and the header row, as one snapshot. Component
/// rows are keyed by their commitments and replace any previous content
/// under the same key.
pub(crate) fn put_account_snapshot(
    conn: &Connection,
    snapshot: &AccountSnapshot,
) -> Result<(), StoreError> {
    snapshot.validate()?;
    put_account_code(conn, &snapshot.code)?;

    let mut stmt_slot = conn.prepare_cached(
        "INSERT INTO account_storage (commitment, slot_name, slot_value, slot_type)
         VALUES (:commitment, :slot_name, :slot_value, :slot_type)
         ON CONFLICT (commitment, slot_name) DO UPDATE
         SET slot_value = :slot_value, slot_type = :slot_type",
    )?;
    for slot in &snapshot.storage_slots {
        stmt_slot.execute(named_params![
            ":commitment": snapshot.header.storage_commitment,
            ":slot_name": slot.name,
            ":slot_value": slot.value,
            ":slot_type": slot.slot_type.code(),
        ])?;
    }

    let mut stmt_map = conn.prepare_cached(
        "INSERT INTO storage_map_entries (root, key, value) VALUES (:root, :key, :value)
         ON CONFLICT (root, key) DO UPDATE SET value = :value",
    )?;
    for entry in &snapshot.storage_map_entries {
        stmt_map.execute(named_params![
            ":root": entry.root,
            ":key": entry.key,
            ":value": entry.value,
        ])?;
    }

    let mut stmt_asset = conn.prepare_cached(
        "INSERT INTO account_assets (root, vault_key, faucet_id_prefix, asset)
         VALUES (:root, :vault_key, :faucet_id_prefix, :asset)
         ON CONFLICT (root, vault_key) DO UPDATE
         SET faucet_id_prefix = :faucet_id_prefix, asset = :asset",
    )?;
    for asset in &snapshot.assets {
        stmt_asset.execute(named_params![
            ":root": snapshot.header.vault_root,
            ":vault_key": asset.vault_key,
            ":faucet_id_prefix": asset.faucet_id_prefix as i64,
            ":asset": asset.asset,
        ])?;
    }

    let mut stmt_header = conn.prepare_cached(
        "INSERT INTO accounts
            (id, account_commitment, code_commitment, storage_commitment, vault_root,
             nonce, account_seed, locked)
         VALUES (:id, :account_commitment, :code_commitment, :storage_commitment, :vault_root,
             :nonce, :account_seed, 0)
         ON CONFLICT (account_commitment) DO UPDATE
         SET code_commitment = :code_commitment,
             storage_commitment = :storage_commitment,
             vault_root = :vault_root,
             nonce = :nonce,
             account_seed = :account_seed",
    )?;
    stmt_header.execute(named_params![
        ":id": snapshot.header.id,
        ":account_commitment": snapshot.header.commitment,
        ":code_commitment": snapshot.header.code_commitment,
        ":storage_commitment": snapshot.header.storage_commitment,
        ":vault_root": snapshot.header.vault_root,
        ":nonce": snapshot.header.nonce,
        ":account_seed": snapshot.seed,
    ])?;
    Ok(())
}

pub(crate) fn put_account_code(conn: &Connection, code: &AccountCode) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO account_code (commitment, code) VALUES (:commitment, :code)
         ON CONFLICT (commitment) DO UPDATE SET code = :code",
    )?;
    stmt.execute(named_params![":commitment": code.commitment, ":code": code.code])?;
    Ok(())
}

pub(crate) fn insert_tracked_account(
    conn: &Connection,
    account_id: AccountId,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached("INSERT OR IGNORE INTO tracked_accounts (id) VALUES (:id)")?;
    stmt.execute(named_params![":id": account_id])?;
    Ok(())
}

pub(crate) fn is_tracked_account(
    conn: &Connection,
    account_id: AccountId,
) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM tracked_accounts WHERE id = :id")?;
    stmt.exists(named_params![":id": account_id])
        .map_err(StoreError::from)
}

/// Marks every stored state of the account as locked. Returns the number
/// of state rows affected.
pub(crate) fn lock_account(conn: &Connection, account_id: AccountId) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached("UPDATE accounts SET locked = 1 WHERE id = :id")?;
    Ok(stmt.execute(named_params![":id": account_id])?)
}

/// Deletes the account state rows with the given commitments: the
/// rollback of speculative states superseded by a stale branch.
/// Deduplicated component rows are left in place.
pub(crate) fn undo_account_states(
    conn: &Connection,
    commitments: &[Digest],
) -> Result<(), StoreError> {
    let mut stmt =
        conn.prepare_cached("DELETE FROM accounts WHERE account_commitment = :commitment")?;
    for commitment in commitments {
        stmt.execute(named_params![":commitment": commitment])?;
    }
    Ok(())
}

// READS
// ================================================================================================

pub(crate) fn get_account_ids<B: Backend>(backend: &B) -> Result<Vec<AccountId>, StoreError> {
    backend.all("SELECT id FROM tracked_accounts ORDER BY id", NO_PARAMS, |row| {
        row.get(0)
    })
}

/// The current header of every account: for each id, the state row with
/// the highest nonce among rows that have not been rolled back.
pub(crate) fn get_account_headers<B: Backend>(
    backend: &B,
) -> Result<Vec<(AccountHeader, AccountStatus)>, StoreError> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts
         JOIN (SELECT id AS latest_id, MAX(nonce) AS max_nonce FROM accounts GROUP BY id) latest
           ON id = latest.latest_id AND nonce = latest.max_nonce
         ORDER BY id"
    );
    let raw = backend.all(&sql, NO_PARAMS, account_from_row)?;
    raw.into_iter()
        .map(|(header, seed, locked)| {
            let status = status_for(&header, seed, locked)?;
            Ok((header, status))
        })
        .collect()
}

pub(crate) fn get_account_header<B: Backend>(
    backend: &B,
    account_id: AccountId,
) -> Result<Option<(AccountHeader, AccountStatus)>, StoreError> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = :id
         ORDER BY nonce DESC LIMIT 1"
    );
    let raw = backend.get(&sql, named_params![":id": account_id], account_from_row)?;
    raw.map(|(header, seed, locked)| {
        let status = status_for(&header, seed, locked)?;
        Ok((header, status))
    })
    .transpose()
}

pub(crate) fn get_account_header_by_commitment<B: Backend>(
    backend: &B,
    commitment: Digest,
) -> Result<Option<AccountHeader>, StoreError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_commitment = :commitment");
    let raw = backend.get(
        &sql,
        named_params![":commitment": commitment],
        account_from_row,
    )?;
    Ok(raw.map(|(header, _, _)| header))
}

/// The full current record of an account: its header and status plus the
/// code, storage, map entries, and vault assets the header commits to.
pub(crate) fn get_account<B: Backend>(
    backend: &B,
    account_id: AccountId,
) -> Result<Option<AccountRecord>, StoreError> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = :id
         ORDER BY nonce DESC LIMIT 1"
    );
    let raw = backend.get(&sql, named_params![":id": account_id], account_from_row)?;
    let Some((header, seed, locked)) = raw else {
        return Ok(None);
    };
    let status = status_for(&header, seed, locked)?;

    let code = backend
        .get(
            "SELECT commitment, code FROM account_code WHERE commitment = :commitment",
            named_params![":commitment": header.code_commitment],
            |row| {
                Ok(AccountCode {
                    commitment: row.get(0)?,
                    code: row.get(1)?,
                })
            },
        )?
        .ok_or_else(|| {
            StoreError::CorruptedData(format!(
                "account code {} is referenced but not stored",
                header.code_commitment
            ))
        })?;

    let raw_slots = backend.all(
        "SELECT slot_name, slot_value, slot_type FROM account_storage
         WHERE commitment = :commitment ORDER BY slot_name",
        named_params![":commitment": header.storage_commitment],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<Word>>(1)?,
                row.get::<_, u8>(2)?,
            ))
        },
    )?;
    let storage_slots = raw_slots
        .into_iter()
        .map(|(name, value, type_code)| {
            Ok(StorageSlot {
                name,
                value,
                slot_type: StorageSlotType::from_code(type_code)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let mut storage_map_entries = Vec::new();
    for slot in &storage_slots {
        let (StorageSlotType::Map, Some(root)) = (slot.slot_type, slot.value) else {
            continue;
        };
        let entries = backend.all(
            "SELECT root, key, value FROM storage_map_entries WHERE root = :root",
            named_params![":root": root],
            |row| {
                Ok(StorageMapEntry {
                    root: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                })
            },
        )?;
        storage_map_entries.extend(entries);
    }

    let raw_assets = backend.all(
        "SELECT vault_key, faucet_id_prefix, asset FROM account_assets WHERE root = :root",
        named_params![":root": header.vault_root],
        |row| {
            Ok((
                row.get::<_, Digest>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
            ))
        },
    )?;
    let assets = raw_assets
        .into_iter()
        .map(|(vault_key, prefix, asset)| AssetEntry {
            vault_key,
            faucet_id_prefix: prefix as u64,
            asset,
        })
        .collect();

    Ok(Some(AccountRecord {
        header,
        status,
        code,
        storage_slots,
        storage_map_entries,
        assets,
    }))
}

// FOREIGN ACCOUNT CODE
// ================================================================================================

/// Caches the code of a foreign account so its script root is known ahead
/// of execution against it.
pub(crate) fn upsert_foreign_account_code(
    conn: &Connection,
    account_id: AccountId,
    code: &AccountCode,
) -> Result<(), StoreError> {
    put_account_code(conn, code)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO foreign_account_code (account_id, code_commitment)
         VALUES (:account_id, :code_commitment)
         ON CONFLICT (account_id) DO UPDATE SET code_commitment = :code_commitment",
    )?;
    stmt.execute(named_params![
        ":account_id": account_id,
        ":code_commitment": code.commitment,
    ])?;
    Ok(())
}

pub(crate) fn get_foreign_account_code<B: Backend>(
    backend: &B,
    account_ids: &[AccountId],
) -> Result<BTreeMap<AccountId, AccountCode>, StoreError> {
    let mut out = BTreeMap::new();
    for account_id in account_ids {
        let code = backend.get(
            "SELECT c.commitment, c.code FROM foreign_account_code f
             JOIN account_code c ON c.commitment = f.code_commitment
             WHERE f.account_id = :account_id",
            named_params![":account_id": account_id],
            |row| {
                Ok(AccountCode {
                    commitment: row.get(0)?,
                    code: row.get(1)?,
                })
            },
        )?;
        if let Some(code) = code {
            out.insert(*account_id, code);
        }
    }
    Ok(out)
}

// ADDRESSES
// ================================================================================================

pub(crate) fn insert_address(
    conn: &Connection,
    address: &str,
    account_id: AccountId,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO addresses (address, account_id) VALUES (:address, :account_id)
         ON CONFLICT (address) DO UPDATE SET account_id = :account_id",
    )?;
    stmt.execute(named_params![":address": address, ":account_id": account_id])?;
    Ok(())
}

pub(crate) fn get_addresses<B: Backend>(
    backend: &B,
) -> Result<Vec<(String, AccountId)>, StoreError> {
    backend.all(
        "SELECT address, account_id FROM addresses ORDER BY address",
        NO_PARAMS,
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::error::StoreError;
    use crate::model::account::{AccountCode, AccountStatus};
    use crate::testing::{account_id, account_snapshot, digest, memory_store};

    #[test]
    fn current_header_has_the_maximum_nonce() {
        let mut store = memory_store();
        store.insert_account(&account_snapshot(1, 0)).unwrap();
        store.update_account(&account_snapshot(1, 2)).unwrap();
        store.update_account(&account_snapshot(1, 1)).unwrap();

        let (header, status) = store.get_account_header(account_id(1)).unwrap().unwrap();
        assert_eq!(header.nonce, 2);
        assert_eq!(status, AccountStatus::Tracked);
    }

    #[test]
    fn undo_restores_the_previous_header() {
        let mut store = memory_store();
        let old = account_snapshot(1, 1);
        let speculative = account_snapshot(1, 2);
        store.insert_account(&old).unwrap();
        store.update_account(&speculative).unwrap();

        let mut rollback = crate::model::sync::StateSyncUpdate::new(
            crate::model::BlockNumber::from_u32(5),
        );
        rollback.account_states_to_rollback = vec![speculative.header.commitment];
        store.apply_state_sync(&rollback).unwrap();

        let (header, _) = store.get_account_header(account_id(1)).unwrap().unwrap();
        assert_eq!(header.nonce, 1);
        assert_eq!(header.commitment, old.header.commitment);
    }

    #[test]
    fn nonce_zero_requires_a_seed() {
        let mut store = memory_store();
        let mut snapshot = account_snapshot(1, 0);
        snapshot.seed = None;
        assert_matches!(
            store.insert_account(&snapshot),
            Err(StoreError::MissingAccountSeed(_))
        );
    }

    #[test]
    fn new_accounts_report_their_seed() {
        let mut store = memory_store();
        let snapshot = account_snapshot(1, 0);
        store.insert_account(&snapshot).unwrap();

        let (_, status) = store.get_account_header(account_id(1)).unwrap().unwrap();
        assert_eq!(
            status,
            AccountStatus::New {
                seed: snapshot.seed.unwrap()
            }
        );
    }

    #[test]
    fn locking_shadows_every_state() {
        let mut store = memory_store();
        store.insert_account(&account_snapshot(1, 1)).unwrap();
        store.update_account(&account_snapshot(1, 2)).unwrap();
        store.lock_account(account_id(1)).unwrap();

        let (_, status) = store.get_account_header(account_id(1)).unwrap().unwrap();
        assert!(status.is_locked());
    }

    #[test]
    fn lock_of_unknown_account_is_an_error() {
        let mut store = memory_store();
        assert_matches!(
            store.lock_account(account_id(9)),
            Err(StoreError::AccountNotFound(_))
        );
    }

    #[test]
    fn full_record_includes_all_components() {
        let mut store = memory_store();
        let snapshot = account_snapshot(1, 1);
        store.insert_account(&snapshot).unwrap();

        let record = store.get_account(account_id(1)).unwrap().unwrap();
        assert_eq!(record.header, snapshot.header);
        assert_eq!(record.code, snapshot.code);
        assert_eq!(record.storage_slots, snapshot.storage_slots);
        assert_eq!(record.storage_map_entries, snapshot.storage_map_entries);
        assert_eq!(record.assets, snapshot.assets);
    }

    #[test]
    fn header_lookup_by_commitment() {
        let mut store = memory_store();
        let snapshot = account_snapshot(1, 1);
        store.insert_account(&snapshot).unwrap();

        let header = store
            .get_account_header_by_commitment(snapshot.header.commitment)
            .unwrap()
            .unwrap();
        assert_eq!(header, snapshot.header);
        assert!(store
            .get_account_header_by_commitment(digest(0xEE))
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_account_requires_tracking() {
        let mut store = memory_store();
        assert_matches!(
            store.update_account(&account_snapshot(3, 1)),
            Err(StoreError::AccountNotFound(_))
        );
    }

    #[test]
    fn foreign_code_is_cached_per_account() {
        let mut store = memory_store();
        let code = AccountCode {
            commitment: digest(0x33),
            code: vec![1, 2, 3],
        };
        store
            .upsert_foreign_account_code(account_id(7), &code)
            .unwrap();

        let cached = store
            .get_foreign_account_code(&[account_id(7), account_id(8)])
            .unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[&account_id(7)], code);
    }

    #[test]
    fn addresses_map_to_accounts() {
        let mut store = memory_store();
        store
            .insert_address("mrdn1qxyz", account_id(1))
            .unwrap();
        store
            .insert_address("mrdn1qxyz", account_id(2))
            .unwrap();

        let addresses = store.get_addresses().unwrap();
        assert_eq!(addresses, vec![("mrdn1qxyz".to_string(), account_id(2))]);
    }
}
