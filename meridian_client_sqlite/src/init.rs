//! Schema bootstrap and the client-version compatibility protocol.
//!
//! [`bootstrap`] is idempotent and safe to call on every open. The version
//! protocol is fail-open: on a breaking version change the store wipes all
//! non-reserved tables and resumes empty rather than refusing to start,
//! forcing a clean resync instead of running against an unreadable layout.

use rusqlite::Connection;
use semver::Version;
use tracing::warn;

use crate::error::StoreError;
use crate::store::settings::{self, CLIENT_VERSION_KEY};

/// Outcome of the client-version compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// The stored data is usable as-is.
    Compatible,
    /// The stored version was incompatible; all non-reserved tables were
    /// dropped and recreated, and local history is gone.
    Reset,
}

pub(crate) const TABLE_ACCOUNT_CODE: &str = "
CREATE TABLE IF NOT EXISTS account_code (
    commitment BLOB NOT NULL PRIMARY KEY,
    code BLOB NOT NULL
)";

pub(crate) const TABLE_ACCOUNTS: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id BLOB NOT NULL,
    account_commitment BLOB NOT NULL PRIMARY KEY,
    code_commitment BLOB NOT NULL,
    storage_commitment BLOB NOT NULL,
    vault_root BLOB NOT NULL,
    nonce INTEGER NOT NULL,
    account_seed BLOB,
    locked INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (code_commitment) REFERENCES account_code (commitment),
    CHECK (nonce > 0 OR account_seed IS NOT NULL)
)";

pub(crate) const TABLE_TRACKED_ACCOUNTS: &str = "
CREATE TABLE IF NOT EXISTS tracked_accounts (
    id BLOB NOT NULL PRIMARY KEY
)";

pub(crate) const TABLE_ACCOUNT_STORAGE: &str = "
CREATE TABLE IF NOT EXISTS account_storage (
    commitment BLOB NOT NULL,
    slot_name TEXT NOT NULL,
    slot_value BLOB,
    slot_type INTEGER NOT NULL,
    PRIMARY KEY (commitment, slot_name)
)";

pub(crate) const TABLE_STORAGE_MAP_ENTRIES: &str = "
CREATE TABLE IF NOT EXISTS storage_map_entries (
    root BLOB NOT NULL,
    key BLOB NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (root, key)
)";

pub(crate) const TABLE_ACCOUNT_ASSETS: &str = "
CREATE TABLE IF NOT EXISTS account_assets (
    root BLOB NOT NULL,
    vault_key BLOB NOT NULL,
    faucet_id_prefix INTEGER NOT NULL,
    asset BLOB,
    PRIMARY KEY (root, vault_key)
)";

pub(crate) const TABLE_ADDRESSES: &str = "
CREATE TABLE IF NOT EXISTS addresses (
    address TEXT NOT NULL PRIMARY KEY,
    account_id BLOB NOT NULL
)";

pub(crate) const TABLE_FOREIGN_ACCOUNT_CODE: &str = "
CREATE TABLE IF NOT EXISTS foreign_account_code (
    account_id BLOB NOT NULL PRIMARY KEY,
    code_commitment BLOB NOT NULL,
    FOREIGN KEY (code_commitment) REFERENCES account_code (commitment)
)";

pub(crate) const TABLE_NOTES_SCRIPTS: &str = "
CREATE TABLE IF NOT EXISTS notes_scripts (
    script_root BLOB NOT NULL PRIMARY KEY,
    serialized_note_script BLOB NOT NULL
)";

pub(crate) const TABLE_INPUT_NOTES: &str = "
CREATE TABLE IF NOT EXISTS input_notes (
    note_id BLOB NOT NULL PRIMARY KEY,
    assets BLOB NOT NULL,
    serial_number BLOB NOT NULL,
    inputs BLOB NOT NULL,
    script_root BLOB NOT NULL,
    nullifier BLOB NOT NULL,
    state_discriminant INTEGER NOT NULL,
    state BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (script_root) REFERENCES notes_scripts (script_root)
)";

pub(crate) const TABLE_OUTPUT_NOTES: &str = "
CREATE TABLE IF NOT EXISTS output_notes (
    note_id BLOB NOT NULL PRIMARY KEY,
    recipient_digest BLOB NOT NULL,
    assets BLOB NOT NULL,
    metadata BLOB NOT NULL,
    nullifier BLOB,
    expected_height INTEGER NOT NULL,
    state_discriminant INTEGER NOT NULL,
    state BLOB NOT NULL
)";

pub(crate) const TABLE_TRANSACTION_SCRIPTS: &str = "
CREATE TABLE IF NOT EXISTS transaction_scripts (
    script_root BLOB NOT NULL PRIMARY KEY,
    script BLOB NOT NULL
)";

pub(crate) const TABLE_TRANSACTIONS: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id BLOB NOT NULL PRIMARY KEY,
    details BLOB NOT NULL,
    script_root BLOB,
    block_num INTEGER NOT NULL,
    status_variant INTEGER NOT NULL,
    status BLOB NOT NULL,
    FOREIGN KEY (script_root) REFERENCES transaction_scripts (script_root)
)";

pub(crate) const TABLE_BLOCK_HEADERS: &str = "
CREATE TABLE IF NOT EXISTS block_headers (
    block_num INTEGER NOT NULL PRIMARY KEY,
    header BLOB NOT NULL,
    partial_blockchain_peaks BLOB NOT NULL,
    has_client_notes INTEGER NOT NULL
)";

pub(crate) const TABLE_PARTIAL_BLOCKCHAIN_NODES: &str = "
CREATE TABLE IF NOT EXISTS partial_blockchain_nodes (
    id INTEGER NOT NULL PRIMARY KEY,
    node BLOB NOT NULL
)";

pub(crate) const TABLE_STATE_SYNC: &str = "
CREATE TABLE IF NOT EXISTS state_sync (
    block_num INTEGER NOT NULL
)";

pub(crate) const TABLE_TAGS: &str = "
CREATE TABLE IF NOT EXISTS tags (
    tag INTEGER NOT NULL,
    source BLOB NOT NULL,
    PRIMARY KEY (tag, source)
)";

pub(crate) const TABLE_SETTINGS: &str = "
CREATE TABLE IF NOT EXISTS settings (
    name TEXT NOT NULL PRIMARY KEY,
    value TEXT NOT NULL
)";

pub(crate) const INDEX_ACCOUNTS_ID_NONCE: &str =
    "CREATE INDEX IF NOT EXISTS idx_accounts_id_nonce ON accounts (id, nonce)";
pub(crate) const INDEX_INPUT_NOTES_STATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_input_notes_state ON input_notes (state_discriminant)";
pub(crate) const INDEX_OUTPUT_NOTES_STATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_output_notes_state ON output_notes (state_discriminant)";

// Every non-reserved table, in creation order: referenced tables precede
// their referents so the statements can run on a connection with foreign
// keys enforced, and a reset can drop them in reverse.
const NON_RESERVED_TABLES: &[&str] = &[
    "account_code",
    "accounts",
    "tracked_accounts",
    "account_storage",
    "storage_map_entries",
    "account_assets",
    "addresses",
    "foreign_account_code",
    "notes_scripts",
    "input_notes",
    "output_notes",
    "transaction_scripts",
    "transactions",
    "block_headers",
    "partial_blockchain_nodes",
    "state_sync",
    "tags",
];

const SCHEMA: &[&str] = &[
    TABLE_ACCOUNT_CODE,
    TABLE_ACCOUNTS,
    TABLE_TRACKED_ACCOUNTS,
    TABLE_ACCOUNT_STORAGE,
    TABLE_STORAGE_MAP_ENTRIES,
    TABLE_ACCOUNT_ASSETS,
    TABLE_ADDRESSES,
    TABLE_FOREIGN_ACCOUNT_CODE,
    TABLE_NOTES_SCRIPTS,
    TABLE_INPUT_NOTES,
    TABLE_OUTPUT_NOTES,
    TABLE_TRANSACTION_SCRIPTS,
    TABLE_TRANSACTIONS,
    TABLE_BLOCK_HEADERS,
    TABLE_PARTIAL_BLOCKCHAIN_NODES,
    TABLE_STATE_SYNC,
    TABLE_TAGS,
    TABLE_SETTINGS,
    INDEX_ACCOUNTS_ID_NONCE,
    INDEX_INPUT_NOTES_STATE,
    INDEX_OUTPUT_NOTES_STATE,
];

/// Sets up the internal structure of the client database.
///
/// Safe to call repeatedly; every statement is `IF NOT EXISTS`.
pub fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
    for sql in SCHEMA {
        conn.execute(sql, [])?;
    }
    // The single logical current-height row.
    conn.execute(
        "INSERT INTO state_sync (block_num)
         SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM state_sync)",
        [],
    )?;
    Ok(())
}

/// Enforces the client-version compatibility protocol against the version
/// stored under the reserved settings key.
///
/// Patch and minor drift within a `major.minor` line is tolerated, as is
/// any downgrade; everything else wipes the store and starts over.
pub(crate) fn ensure_client_version(
    conn: &Connection,
    current: &str,
) -> Result<VersionCheck, StoreError> {
    let stored = match settings::get_setting(conn, CLIENT_VERSION_KEY)? {
        None => {
            settings::put_setting(conn, CLIENT_VERSION_KEY, current)?;
            return Ok(VersionCheck::Compatible);
        }
        Some(stored) => stored,
    };

    if stored == current {
        return Ok(VersionCheck::Compatible);
    }

    if versions_compatible(&stored, current) {
        settings::put_setting(conn, CLIENT_VERSION_KEY, current)?;
        return Ok(VersionCheck::Compatible);
    }

    warn!(
        stored = %stored,
        current = %current,
        "incompatible client version, resetting store"
    );
    reset_store(conn)?;
    settings::put_setting(conn, CLIENT_VERSION_KEY, current)?;
    Ok(VersionCheck::Reset)
}

fn versions_compatible(stored: &str, current: &str) -> bool {
    let (Ok(stored), Ok(current)) = (Version::parse(stored), Version::parse(current)) else {
        return false;
    };
    (current.major, current.minor) == (stored.major, stored.minor) || current <= stored
}

// Drops every non-reserved table and rebuilds the schema. The settings
// table survives because it carries the version key itself.
//
// Known tables are dropped children-first so the implicit DELETE a DROP
// performs never violates a foreign key. Tables left behind by older
// schema revisions are swept afterwards.
fn reset_store(conn: &Connection) -> Result<(), StoreError> {
    for table in NON_RESERVED_TABLES.iter().rev() {
        conn.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])?;
    }

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name <> 'settings'",
    )?;
    let stragglers = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);
    for table in stragglers {
        conn.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])?;
    }

    bootstrap(conn)
}
