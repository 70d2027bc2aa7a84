//! *An SQLite-based Meridian light client store.*
//!
//! This crate is the persistence and synchronization layer of a Meridian
//! rollup light client. It maintains a local, durable, queryable mirror
//! of the tracked portion of the chain — accounts, notes, transactions,
//! block headers, and a partial MMR authentication structure — and
//! absorbs sync deltas received from a remote node as atomic state
//! transitions.
//!
//! # Design
//!
//! The store is built from four pieces:
//!
//! - A [`Backend`] adapter with two physical engines, [`NativeBackend`]
//!   (file-backed) and [`MemoryBackend`] (embedded in-memory). Both use
//!   the same table layout, so a store produced by one engine is openable
//!   by the other.
//! - A schema manager ([`init`]) that bootstraps tables idempotently and
//!   enforces a client-version compatibility protocol. Breaking version
//!   changes wipe the store and force a clean resync (fail-open).
//! - Record stores ([`store`]) exposing idempotent upsert-by-key and
//!   filtered reads over the normalized tables.
//! - A synchronization applier, reachable through
//!   [`ClientStore::apply_state_sync`], that applies one
//!   [`StateSyncUpdate`] as a single all-or-nothing transaction.
//!
//! All access goes through an explicit [`ClientStore`] handle returned by
//! [`ClientStore::open`] or [`ClientStore::open_in_memory`]; there is no
//! process-wide registry. One logical client owns one handle: mutating
//! calls take `&mut self`, and concurrent deltas against the same store
//! must be serialized by the caller.
//!
//! [`StateSyncUpdate`]: crate::model::sync::StateSyncUpdate

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub mod backend;
pub mod error;
pub mod init;
pub mod model;
pub mod store;

mod sync;

#[cfg(test)]
mod testing;

pub use crate::backend::{Backend, MemoryBackend, NativeBackend};
pub use crate::error::StoreError;
pub use crate::init::VersionCheck;
pub use crate::store::chain::PartialBlockchainFilter;
pub use crate::store::notes::NoteFilter;
pub use crate::store::transactions::TransactionFilter;

use crate::model::account::{AccountCode, AccountHeader, AccountRecord, AccountSnapshot, AccountStatus};
use crate::model::note::{InputNoteRecord, OutputNoteRecord};
use crate::model::sync::{NoteTagRecord, StateSyncUpdate};
use crate::model::transaction::TransactionRecord;
use crate::model::{
    AccountId, BlockHeaderRecord, BlockNumber, Digest, InOrderIndex, NoteTag, Nullifier,
};

/// The client version persisted under the reserved settings key and
/// checked on every open.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A handle to one client store.
///
/// Mutating operations run inside a backend transaction each; reads see
/// whatever isolation the underlying engine provides. The handle is the
/// unit of single-writer discipline.
pub struct ClientStore<B: Backend> {
    backend: B,
}

/// A store over the file-backed engine.
pub type NativeStore = ClientStore<NativeBackend>;

/// A store over the embedded in-memory engine.
pub type MemoryStore = ClientStore<MemoryBackend>;

impl ClientStore<NativeBackend> {
    /// Opens (creating if needed) a store at the given path, bootstraps
    /// the schema, and runs the version compatibility check.
    ///
    /// A [`VersionCheck::Reset`] outcome means stored history was
    /// discarded and a full resync is required.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, VersionCheck), StoreError> {
        Self::initialize(NativeBackend::open(path)?)
    }
}

impl ClientStore<MemoryBackend> {
    /// Opens a store over the embedded in-memory engine.
    pub fn open_in_memory() -> Result<(Self, VersionCheck), StoreError> {
        Self::initialize(MemoryBackend::open()?)
    }
}

impl<B: Backend> ClientStore<B> {
    /// Wraps an already-opened backend, bootstrapping the schema and
    /// enforcing the client-version protocol.
    pub fn initialize(mut backend: B) -> Result<(Self, VersionCheck), StoreError> {
        let check = backend.transaction(|tx| {
            init::bootstrap(tx)?;
            init::ensure_client_version(tx, CLIENT_VERSION)
        })?;
        Ok((ClientStore { backend }, check))
    }

    /// Seconds since the Unix epoch, used to stamp `created_at` on
    /// locally created input notes. `None` if the clock is unavailable
    /// or predates the epoch.
    pub fn current_timestamp(&self) -> Option<u64> {
        u64::try_from(time::OffsetDateTime::now_utc().unix_timestamp()).ok()
    }

    // SYNC
    // --------------------------------------------------------------------------------------------

    /// The block number of the last applied sync delta.
    pub fn get_sync_height(&self) -> Result<BlockNumber, StoreError> {
        store::chain::get_sync_height(&self.backend)
    }

    /// Applies one sync delta as a single all-or-nothing transaction.
    ///
    /// On error the store is exactly at its pre-apply state; the caller
    /// retries the whole delta. Applying the same delta again is a no-op.
    pub fn apply_state_sync(&mut self, update: &StateSyncUpdate) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| sync::apply_state_sync(tx, update))
    }

    // ACCOUNTS
    // --------------------------------------------------------------------------------------------

    /// Registers a locally created account and writes its initial
    /// snapshot.
    pub fn insert_account(&mut self, snapshot: &AccountSnapshot) -> Result<(), StoreError> {
        self.backend.transaction(|tx| {
            store::accounts::put_account_snapshot(tx, snapshot)?;
            store::accounts::insert_tracked_account(tx, snapshot.header.id)
        })
    }

    /// Writes a new state snapshot for an account that is already
    /// tracked.
    pub fn update_account(&mut self, snapshot: &AccountSnapshot) -> Result<(), StoreError> {
        self.backend.transaction(|tx| {
            if !store::accounts::is_tracked_account(tx, snapshot.header.id)? {
                return Err(StoreError::AccountNotFound(snapshot.header.id));
            }
            store::accounts::put_account_snapshot(tx, snapshot)
        })
    }

    pub fn get_account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        store::accounts::get_account_ids(&self.backend)
    }

    /// Current headers of all accounts: for each id, the state with the
    /// highest nonce among states that have not been rolled back.
    pub fn get_account_headers(&self) -> Result<Vec<(AccountHeader, AccountStatus)>, StoreError> {
        store::accounts::get_account_headers(&self.backend)
    }

    pub fn get_account_header(
        &self,
        account_id: AccountId,
    ) -> Result<Option<(AccountHeader, AccountStatus)>, StoreError> {
        store::accounts::get_account_header(&self.backend, account_id)
    }

    pub fn get_account_header_by_commitment(
        &self,
        commitment: Digest,
    ) -> Result<Option<AccountHeader>, StoreError> {
        store::accounts::get_account_header_by_commitment(&self.backend, commitment)
    }

    /// The full current record of an account, including code, storage,
    /// map entries, and vault assets.
    pub fn get_account(&self, account_id: AccountId) -> Result<Option<AccountRecord>, StoreError> {
        store::accounts::get_account(&self.backend, account_id)
    }

    /// Marks an account invalid, e.g. after a commitment mismatch.
    pub fn lock_account(&mut self, account_id: AccountId) -> Result<(), StoreError> {
        self.backend.transaction(|tx| {
            let locked = store::accounts::lock_account(tx, account_id)?;
            if locked == 0 {
                return Err(StoreError::AccountNotFound(account_id));
            }
            Ok(())
        })
    }

    /// Caches the code of a foreign account by its id.
    pub fn upsert_foreign_account_code(
        &mut self,
        account_id: AccountId,
        code: &AccountCode,
    ) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::accounts::upsert_foreign_account_code(tx, account_id, code))
    }

    pub fn get_foreign_account_code(
        &self,
        account_ids: &[AccountId],
    ) -> Result<BTreeMap<AccountId, AccountCode>, StoreError> {
        store::accounts::get_foreign_account_code(&self.backend, account_ids)
    }

    pub fn insert_address(&mut self, address: &str, account_id: AccountId) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::accounts::insert_address(tx, address, account_id))
    }

    pub fn get_addresses(&self) -> Result<Vec<(String, AccountId)>, StoreError> {
        store::accounts::get_addresses(&self.backend)
    }

    // NOTES
    // --------------------------------------------------------------------------------------------

    /// Inserts or replaces input notes; a note with an existing id is
    /// replaced whole.
    pub fn upsert_input_notes(&mut self, notes: &[InputNoteRecord]) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::notes::upsert_input_notes(tx, notes))
    }

    pub fn upsert_output_notes(&mut self, notes: &[OutputNoteRecord]) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::notes::upsert_output_notes(tx, notes))
    }

    pub fn get_input_notes(&self, filter: &NoteFilter) -> Result<Vec<InputNoteRecord>, StoreError> {
        store::notes::get_input_notes(&self.backend, filter)
    }

    pub fn get_output_notes(
        &self,
        filter: &NoteFilter,
    ) -> Result<Vec<OutputNoteRecord>, StoreError> {
        store::notes::get_output_notes(&self.backend, filter)
    }

    /// Nullifiers of all input notes not yet observed as spent.
    pub fn get_unspent_nullifiers(&self) -> Result<Vec<Nullifier>, StoreError> {
        store::notes::get_unspent_nullifiers(&self.backend)
    }

    // TRANSACTIONS
    // --------------------------------------------------------------------------------------------

    pub fn upsert_transactions(&mut self, records: &[TransactionRecord]) -> Result<(), StoreError> {
        self.backend.transaction(|tx| {
            for record in records {
                store::transactions::upsert_transaction_record(tx, record)?;
            }
            Ok(())
        })
    }

    pub fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        store::transactions::get_transactions(&self.backend, filter)
    }

    // CHAIN DATA
    // --------------------------------------------------------------------------------------------

    /// Inserts a block header if absent; may promote the relevance flag
    /// of an existing row from false to true, never the reverse.
    pub fn insert_block_header(&mut self, record: &BlockHeaderRecord) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::chain::insert_block_header(tx, record))
    }

    /// Returns the stored headers among the requested block numbers;
    /// missing blocks are absent from the result.
    pub fn get_block_headers(
        &self,
        block_numbers: &BTreeSet<BlockNumber>,
    ) -> Result<Vec<BlockHeaderRecord>, StoreError> {
        store::chain::get_block_headers(&self.backend, block_numbers)
    }

    pub fn get_block_header_by_num(
        &self,
        block_num: BlockNumber,
    ) -> Result<Option<BlockHeaderRecord>, StoreError> {
        store::chain::get_block_header(&self.backend, block_num)
    }

    /// Headers of blocks carrying notes relevant to this client.
    pub fn get_tracked_block_headers(&self) -> Result<Vec<BlockHeaderRecord>, StoreError> {
        store::chain::get_tracked_block_headers(&self.backend)
    }

    /// Inserts MMR authentication nodes; existing positions are never
    /// overwritten.
    pub fn insert_partial_blockchain_nodes(
        &mut self,
        nodes: &[(InOrderIndex, Digest)],
    ) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::chain::insert_partial_blockchain_nodes(tx, nodes))
    }

    pub fn get_partial_blockchain_nodes(
        &self,
        filter: &PartialBlockchainFilter,
    ) -> Result<BTreeMap<InOrderIndex, Digest>, StoreError> {
        store::chain::get_partial_blockchain_nodes(&self.backend, filter)
    }

    /// MMR peaks stored alongside the header at the given height.
    pub fn get_partial_blockchain_peaks(
        &self,
        block_num: BlockNumber,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        store::chain::get_partial_blockchain_peaks(&self.backend, block_num)
    }

    /// Deletes headers that carry no client notes, keeping genesis and
    /// the current sync height. Returns the number of headers removed.
    pub fn prune_irrelevant_blocks(&mut self) -> Result<usize, StoreError> {
        self.backend
            .transaction(|tx| store::chain::prune_irrelevant_blocks(tx))
    }

    // TAGS
    // --------------------------------------------------------------------------------------------

    /// Starts tracking a tag. Returns false if it was already tracked.
    pub fn add_note_tag(&mut self, record: &NoteTagRecord) -> Result<bool, StoreError> {
        self.backend
            .transaction(|tx| store::tags::add_note_tag(tx, record))
    }

    /// Stops tracking a tag. Returns the number of tag rows removed.
    pub fn remove_note_tag(&mut self, record: &NoteTagRecord) -> Result<usize, StoreError> {
        self.backend
            .transaction(|tx| store::tags::remove_note_tag(tx, record))
    }

    pub fn get_note_tags(&self) -> Result<Vec<NoteTagRecord>, StoreError> {
        store::tags::get_note_tags(&self.backend)
    }

    pub fn get_unique_note_tags(&self) -> Result<BTreeSet<NoteTag>, StoreError> {
        store::tags::get_unique_note_tags(&self.backend)
    }

    // SETTINGS
    // --------------------------------------------------------------------------------------------

    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        self.backend
            .transaction(|tx| store::settings::put_setting(tx, name, value))
    }

    pub fn get_setting(&self, name: &str) -> Result<Option<String>, StoreError> {
        store::settings::fetch_setting(&self.backend, name)
    }

    /// Removes a setting. The reserved client-version key is rejected.
    pub fn remove_setting(&mut self, name: &str) -> Result<usize, StoreError> {
        self.backend
            .transaction(|tx| store::settings::remove_setting(tx, name))
    }

    /// Every setting except the reserved client-version key.
    pub fn list_settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        store::settings::list_settings(&self.backend)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use crate::model::note::InputNoteState;
    use crate::model::sync::StateSyncUpdate;
    use crate::model::BlockNumber;
    use crate::store::notes::NoteFilter;
    use crate::testing::input_note;
    use crate::{ClientStore, VersionCheck, CLIENT_VERSION};

    #[test]
    fn on_disk_store_survives_reopen() {
        let data_file = NamedTempFile::new().unwrap();

        let (mut store, check) = ClientStore::open(data_file.path()).unwrap();
        assert_eq!(check, VersionCheck::Compatible);

        let mut update = StateSyncUpdate::new(BlockNumber::from_u32(100));
        update.updated_input_notes = vec![input_note(
            1,
            InputNoteState::Committed {
                block_num: BlockNumber::from_u32(100),
            },
        )];
        store.apply_state_sync(&update).unwrap();
        drop(store);

        let (store, check) = ClientStore::open(data_file.path()).unwrap();
        assert_eq!(check, VersionCheck::Compatible);
        assert_eq!(store.get_sync_height().unwrap().as_u32(), 100);
        assert_eq!(store.get_input_notes(&NoteFilter::All).unwrap().len(), 1);
        assert_eq!(
            store.get_setting("client_version").unwrap().as_deref(),
            Some(CLIENT_VERSION)
        );
    }

    #[test]
    fn fresh_store_starts_at_genesis_height() {
        let (store, _) = ClientStore::open_in_memory().unwrap();
        assert_eq!(store.get_sync_height().unwrap(), BlockNumber::GENESIS);
        assert!(store.get_account_ids().unwrap().is_empty());
    }
}
