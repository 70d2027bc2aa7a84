//! Shared fixtures for the test suite.
//!
//! Fixtures are deterministic: every record is derived from a single fill
//! byte so tests can reconstruct the values they expect to read back.

use crate::model::account::{
    AccountCode, AccountHeader, AccountSnapshot, AssetEntry, StorageMapEntry, StorageSlot,
    StorageSlotType,
};
use crate::model::note::{
    InputNoteRecord, InputNoteState, NoteScript, OutputNoteRecord, OutputNoteState,
};
use crate::model::transaction::{TransactionRecord, TransactionScript, TransactionStatus};
use crate::model::{
    AccountId, BlockHeaderRecord, BlockNumber, Digest, NoteId, Nullifier, TransactionId,
};
use crate::{ClientStore, MemoryStore, VersionCheck};

pub(crate) fn memory_store() -> MemoryStore {
    let (store, check) = ClientStore::open_in_memory().unwrap();
    assert_eq!(check, VersionCheck::Compatible);
    store
}

pub(crate) fn digest(fill: u8) -> Digest {
    Digest::new([fill; 32])
}

pub(crate) fn account_id(fill: u8) -> AccountId {
    AccountId::new([fill; 16])
}

pub(crate) fn note_id(fill: u8) -> NoteId {
    NoteId(digest(fill))
}

pub(crate) fn nullifier(fill: u8) -> Nullifier {
    Nullifier(digest(fill ^ 0x5A))
}

pub(crate) fn transaction_id(fill: u8) -> TransactionId {
    TransactionId(digest(fill ^ 0xA5))
}

/// An account state whose commitment varies with the nonce, so each nonce
/// produces a distinct historical row for the same id.
pub(crate) fn account_snapshot(fill: u8, nonce: u64) -> AccountSnapshot {
    let mut commitment = [fill; 32];
    commitment[31] = nonce as u8;
    let map_root = digest(fill ^ 5);
    AccountSnapshot {
        header: AccountHeader {
            id: account_id(fill),
            commitment: Digest::new(commitment),
            nonce,
            vault_root: digest(fill ^ 1),
            storage_commitment: digest(fill ^ 2),
            code_commitment: digest(fill ^ 3),
        },
        seed: (nonce == 0).then(|| digest(fill ^ 0xAA)),
        code: AccountCode {
            commitment: digest(fill ^ 3),
            code: vec![fill; 8],
        },
        storage_slots: vec![
            StorageSlot {
                name: "faucet_limit".to_string(),
                value: Some(digest(fill ^ 4)),
                slot_type: StorageSlotType::Value,
            },
            StorageSlot {
                name: "allowlist".to_string(),
                value: Some(map_root),
                slot_type: StorageSlotType::Map,
            },
        ],
        storage_map_entries: vec![StorageMapEntry {
            root: map_root,
            key: digest(fill ^ 6),
            value: digest(fill ^ 7),
        }],
        assets: vec![AssetEntry {
            vault_key: digest(fill ^ 8),
            faucet_id_prefix: u64::from(fill),
            asset: Some(vec![fill; 12]),
        }],
    }
}

pub(crate) fn input_note(fill: u8, state: InputNoteState) -> InputNoteRecord {
    InputNoteRecord {
        id: note_id(fill),
        assets: vec![fill; 10],
        serial_number: digest(fill ^ 0x11),
        inputs: vec![fill; 4],
        script: NoteScript {
            root: digest(fill ^ 0x22),
            script: vec![fill; 6],
        },
        nullifier: nullifier(fill),
        state,
        created_at: 1_700_000_000,
    }
}

pub(crate) fn output_note(fill: u8, state: OutputNoteState) -> OutputNoteRecord {
    OutputNoteRecord {
        id: note_id(fill),
        recipient_digest: digest(fill ^ 0x33),
        assets: vec![fill; 10],
        metadata: vec![fill; 5],
        nullifier: Some(nullifier(fill)),
        expected_height: BlockNumber::from_u32(64),
        state,
    }
}

pub(crate) fn transaction_record(
    fill: u8,
    block_num: u32,
    status: TransactionStatus,
) -> TransactionRecord {
    TransactionRecord {
        id: transaction_id(fill),
        details: vec![fill; 16],
        script: Some(TransactionScript {
            root: digest(fill ^ 0x44),
            script: vec![fill; 7],
        }),
        block_num: BlockNumber::from_u32(block_num),
        status,
    }
}

pub(crate) fn block_header(block_num: u32, has_client_notes: bool) -> BlockHeaderRecord {
    BlockHeaderRecord {
        block_num: BlockNumber::from_u32(block_num),
        header: vec![block_num as u8; 32],
        partial_blockchain_peaks: vec![block_num as u8; 16],
        has_client_notes,
    }
}
