//! Account records stored by the client.
//!
//! Every historical account state is kept as its own row keyed by the
//! state commitment; the current header for an id is the row with the
//! highest nonce among states that have not been rolled back.

use crate::error::StoreError;
use crate::model::{AccountId, Digest, Word};

/// The commitment fields of a single account state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHeader {
    pub id: AccountId,
    /// Commitment to the full account state described by this header.
    pub commitment: Digest,
    /// Version counter; each value corresponds to one historical state.
    pub nonce: u64,
    pub vault_root: Digest,
    pub storage_commitment: Digest,
    pub code_commitment: Digest,
}

/// Account code, deduplicated across states by its commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCode {
    pub commitment: Digest,
    pub code: Vec<u8>,
}

/// The kind of value held by a named storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSlotType {
    /// A single word.
    Value,
    /// The root of a key-value map whose entries are stored separately.
    Map,
}

impl StorageSlotType {
    pub(crate) fn code(self) -> u8 {
        match self {
            StorageSlotType::Value => 0,
            StorageSlotType::Map => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self, StoreError> {
        match code {
            0 => Ok(StorageSlotType::Value),
            1 => Ok(StorageSlotType::Map),
            other => Err(StoreError::CorruptedData(format!(
                "unrecognized storage slot type {other}"
            ))),
        }
    }
}

/// A named storage slot under a storage commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSlot {
    pub name: String,
    pub value: Option<Word>,
    pub slot_type: StorageSlotType,
}

/// One entry of a storage map, keyed by the map root it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMapEntry {
    pub root: Word,
    pub key: Word,
    pub value: Word,
}

/// One asset held in an account vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub vault_key: Digest,
    /// Id prefix of the faucet that issued the asset, for fungible lookups.
    pub faucet_id_prefix: u64,
    /// The serialized asset, opaque at this layer.
    pub asset: Option<Vec<u8>>,
}

/// A complete account state as delivered by the node or built locally:
/// the header row plus all component tables it commits to. Written to the
/// store as one atomic snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub header: AccountHeader,
    /// The seed the account was created from. Required while the account
    /// is still at nonce zero.
    pub seed: Option<Word>,
    pub code: AccountCode,
    pub storage_slots: Vec<StorageSlot>,
    pub storage_map_entries: Vec<StorageMapEntry>,
    pub assets: Vec<AssetEntry>,
}

impl AccountSnapshot {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.header.nonce == 0 && self.seed.is_none() {
            return Err(StoreError::MissingAccountSeed(self.header.id));
        }
        Ok(())
    }
}

/// The client's view of an account's standing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    /// Created locally and not yet observed on chain; the seed is still
    /// needed to prove the account id derivation.
    New { seed: Word },
    /// Tracked and consistent with the chain as of the last sync.
    Tracked,
    /// The local state commitment disagreed with the authoritative one.
    Locked,
}

impl AccountStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, AccountStatus::Locked)
    }
}

/// An account's current header together with all of its components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub header: AccountHeader,
    pub status: AccountStatus,
    pub code: AccountCode,
    pub storage_slots: Vec<StorageSlot>,
    pub storage_map_entries: Vec<StorageMapEntry>,
    pub assets: Vec<AssetEntry>,
}
