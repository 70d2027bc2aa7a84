//! The sync delta absorbed by the store in one atomic step, and the note
//! tags that scope what the node sends.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::StoreError;
use crate::model::account::AccountSnapshot;
use crate::model::note::{InputNoteRecord, OutputNoteRecord};
use crate::model::transaction::TransactionRecord;
use crate::model::{
    AccountId, BlockHeaderRecord, BlockNumber, Digest, InOrderIndex, NoteId, NoteTag,
};

// NOTE TAGS
// ================================================================================================

/// What caused a tag to be tracked. Tags sourced from a note are dropped
/// once that note is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoteTagSource {
    /// Added explicitly by the user.
    User,
    /// Derived from a tracked account.
    Account(AccountId),
    /// Derived from an expected note.
    Note(NoteId),
}

impl NoteTagSource {
    const SOURCE_USER: u8 = 0;
    const SOURCE_ACCOUNT: u8 = 1;
    const SOURCE_NOTE: u8 = 2;

    pub(crate) fn write_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            NoteTagSource::User => writer.write_u8(Self::SOURCE_USER),
            NoteTagSource::Account(account_id) => {
                writer.write_u8(Self::SOURCE_ACCOUNT)?;
                writer.write_all(account_id.as_bytes())
            }
            NoteTagSource::Note(note_id) => {
                writer.write_u8(Self::SOURCE_NOTE)?;
                writer.write_all(note_id.as_bytes())
            }
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.write_into(&mut buffer)
            .expect("writing to a Vec cannot fail");
        buffer
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let corrupt = |e| StoreError::CorruptedData(format!("malformed note tag source: {e}"));
        let mut reader = bytes;
        let source = match reader.read_u8().map_err(corrupt)? {
            Self::SOURCE_USER => NoteTagSource::User,
            Self::SOURCE_ACCOUNT => {
                let mut id = [0u8; 16];
                reader.read_exact(&mut id).map_err(corrupt)?;
                NoteTagSource::Account(AccountId::new(id))
            }
            Self::SOURCE_NOTE => {
                let mut id = [0u8; 32];
                reader.read_exact(&mut id).map_err(corrupt)?;
                NoteTagSource::Note(NoteId(Digest::new(id)))
            }
            other => {
                return Err(StoreError::CorruptedData(format!(
                    "unrecognized note tag source {other}"
                )))
            }
        };
        if !reader.is_empty() {
            return Err(StoreError::CorruptedData(
                "trailing bytes after note tag source".into(),
            ));
        }
        Ok(source)
    }
}

/// A tracked tag together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NoteTagRecord {
    pub tag: NoteTag,
    pub source: NoteTagSource,
}

impl NoteTagRecord {
    pub fn with_note_source(tag: NoteTag, note_id: NoteId) -> Self {
        NoteTagRecord {
            tag,
            source: NoteTagSource::Note(note_id),
        }
    }

    pub fn with_account_source(tag: NoteTag, account_id: AccountId) -> Self {
        NoteTagRecord {
            tag,
            source: NoteTagSource::Account(account_id),
        }
    }
}

// STATE SYNC UPDATE
// ================================================================================================

/// One sync delta: every chain/note/account/transaction fact received
/// from the node in a single synchronization round, already decoded into
/// domain records.
///
/// Applied by [`ClientStore::apply_state_sync`] as a single all-or-nothing
/// transaction.
///
/// [`ClientStore::apply_state_sync`]: crate::ClientStore::apply_state_sync
#[derive(Debug, Clone, Default)]
pub struct StateSyncUpdate {
    /// The new sync height. Heights at or below the stored one leave the
    /// stored height unchanged.
    pub block_num: BlockNumber,
    pub block_headers: Vec<BlockHeaderRecord>,
    /// New MMR authentication nodes, keyed by in-order position.
    pub partial_blockchain_nodes: Vec<(InOrderIndex, Digest)>,
    pub updated_input_notes: Vec<InputNoteRecord>,
    pub updated_output_notes: Vec<OutputNoteRecord>,
    pub updated_transactions: Vec<TransactionRecord>,
    /// Commitments of account states superseded by a stale branch.
    pub account_states_to_rollback: Vec<Digest>,
    pub updated_accounts: Vec<AccountSnapshot>,
    /// Tags whose owning note is now committed.
    pub tags_to_remove: Vec<NoteTagRecord>,
    /// Accounts whose local commitment disagrees with the authoritative one.
    pub accounts_to_lock: Vec<AccountId>,
}

impl StateSyncUpdate {
    pub fn new(block_num: BlockNumber) -> Self {
        StateSyncUpdate {
            block_num,
            ..Default::default()
        }
    }
}
