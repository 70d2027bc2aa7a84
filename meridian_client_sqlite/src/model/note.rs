//! Input and output note records and their state machines.
//!
//! Note state is stored as a discriminant column (for SQL filtering)
//! alongside the serialized state payload, and decoded back into the
//! explicit enums below at the store boundary.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::StoreError;
use crate::model::{BlockNumber, Digest, NoteId, Nullifier, TransactionId, Word};

/// A note script, deduplicated across notes by its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteScript {
    pub root: Digest,
    pub script: Vec<u8>,
}

// INPUT NOTE STATE
// ================================================================================================

/// The state machine of a consumable note.
///
/// Discriminant mapping (also materialized in the `state_discriminant`
/// column): 0 Expected, 1 Unverified, 2 Committed, 3 Invalid,
/// 4 ProcessingAuthenticated, 5 ProcessingUnauthenticated,
/// 6 ConsumedAuthenticatedLocal, 7 ConsumedUnauthenticatedLocal,
/// 8 ConsumedExternal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputNoteState {
    /// Known to the client but not yet seen in a block.
    Expected,
    /// Claimed to be included at the given block, inclusion proof not yet
    /// checked against local chain data.
    Unverified { block_num: BlockNumber },
    /// Included in the chain at the given block.
    Committed { block_num: BlockNumber },
    /// Inclusion verification failed at the given block.
    Invalid { block_num: BlockNumber },
    /// Being consumed by a local transaction whose inputs are
    /// authenticated against the chain.
    ProcessingAuthenticated {
        consumer_transaction: TransactionId,
        submission_height: BlockNumber,
    },
    /// Being consumed by a local transaction before inclusion has been
    /// authenticated.
    ProcessingUnauthenticated {
        consumer_transaction: TransactionId,
        submission_height: BlockNumber,
    },
    /// Consumed by a local transaction that has been committed.
    ConsumedAuthenticatedLocal {
        nullifier_block_num: BlockNumber,
        consumer_transaction: TransactionId,
    },
    /// Consumed by a local transaction whose note inclusion was never
    /// authenticated locally.
    ConsumedUnauthenticatedLocal {
        nullifier_block_num: BlockNumber,
        consumer_transaction: TransactionId,
    },
    /// Nullifier observed on chain without a matching local transaction.
    ConsumedExternal { nullifier_block_num: BlockNumber },
}

impl InputNoteState {
    pub const STATE_EXPECTED: u8 = 0;
    pub const STATE_UNVERIFIED: u8 = 1;
    pub const STATE_COMMITTED: u8 = 2;
    pub const STATE_INVALID: u8 = 3;
    pub const STATE_PROCESSING_AUTHENTICATED: u8 = 4;
    pub const STATE_PROCESSING_UNAUTHENTICATED: u8 = 5;
    pub const STATE_CONSUMED_AUTHENTICATED_LOCAL: u8 = 6;
    pub const STATE_CONSUMED_UNAUTHENTICATED_LOCAL: u8 = 7;
    pub const STATE_CONSUMED_EXTERNAL: u8 = 8;

    /// Discriminants of states whose nullifier has not been observed on
    /// chain. Fixed allow-list used by the unspent-nullifier query.
    pub const UNSPENT_DISCRIMINANTS: [u8; 5] = [
        Self::STATE_EXPECTED,
        Self::STATE_UNVERIFIED,
        Self::STATE_COMMITTED,
        Self::STATE_PROCESSING_AUTHENTICATED,
        Self::STATE_PROCESSING_UNAUTHENTICATED,
    ];

    pub fn discriminant(&self) -> u8 {
        match self {
            InputNoteState::Expected => Self::STATE_EXPECTED,
            InputNoteState::Unverified { .. } => Self::STATE_UNVERIFIED,
            InputNoteState::Committed { .. } => Self::STATE_COMMITTED,
            InputNoteState::Invalid { .. } => Self::STATE_INVALID,
            InputNoteState::ProcessingAuthenticated { .. } => Self::STATE_PROCESSING_AUTHENTICATED,
            InputNoteState::ProcessingUnauthenticated { .. } => {
                Self::STATE_PROCESSING_UNAUTHENTICATED
            }
            InputNoteState::ConsumedAuthenticatedLocal { .. } => {
                Self::STATE_CONSUMED_AUTHENTICATED_LOCAL
            }
            InputNoteState::ConsumedUnauthenticatedLocal { .. } => {
                Self::STATE_CONSUMED_UNAUTHENTICATED_LOCAL
            }
            InputNoteState::ConsumedExternal { .. } => Self::STATE_CONSUMED_EXTERNAL,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.discriminant() >= Self::STATE_CONSUMED_AUTHENTICATED_LOCAL
    }

    pub(crate) fn write_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self.discriminant())?;
        match self {
            InputNoteState::Expected => {}
            InputNoteState::Unverified { block_num }
            | InputNoteState::Committed { block_num }
            | InputNoteState::Invalid { block_num } => {
                writer.write_u32::<LittleEndian>(block_num.as_u32())?;
            }
            InputNoteState::ProcessingAuthenticated {
                consumer_transaction,
                submission_height,
            }
            | InputNoteState::ProcessingUnauthenticated {
                consumer_transaction,
                submission_height,
            } => {
                writer.write_all(consumer_transaction.as_bytes())?;
                writer.write_u32::<LittleEndian>(submission_height.as_u32())?;
            }
            InputNoteState::ConsumedAuthenticatedLocal {
                nullifier_block_num,
                consumer_transaction,
            }
            | InputNoteState::ConsumedUnauthenticatedLocal {
                nullifier_block_num,
                consumer_transaction,
            } => {
                writer.write_u32::<LittleEndian>(nullifier_block_num.as_u32())?;
                writer.write_all(consumer_transaction.as_bytes())?;
            }
            InputNoteState::ConsumedExternal {
                nullifier_block_num,
            } => {
                writer.write_u32::<LittleEndian>(nullifier_block_num.as_u32())?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.write_into(&mut buffer)
            .expect("writing to a Vec cannot fail");
        buffer
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let discriminant = reader.read_u8()?;
        let state = match discriminant {
            Self::STATE_EXPECTED => InputNoteState::Expected,
            Self::STATE_UNVERIFIED => InputNoteState::Unverified {
                block_num: read_block_num(reader)?,
            },
            Self::STATE_COMMITTED => InputNoteState::Committed {
                block_num: read_block_num(reader)?,
            },
            Self::STATE_INVALID => InputNoteState::Invalid {
                block_num: read_block_num(reader)?,
            },
            Self::STATE_PROCESSING_AUTHENTICATED => InputNoteState::ProcessingAuthenticated {
                consumer_transaction: TransactionId(read_digest(reader)?),
                submission_height: read_block_num(reader)?,
            },
            Self::STATE_PROCESSING_UNAUTHENTICATED => InputNoteState::ProcessingUnauthenticated {
                consumer_transaction: TransactionId(read_digest(reader)?),
                submission_height: read_block_num(reader)?,
            },
            Self::STATE_CONSUMED_AUTHENTICATED_LOCAL => InputNoteState::ConsumedAuthenticatedLocal {
                nullifier_block_num: read_block_num(reader)?,
                consumer_transaction: TransactionId(read_digest(reader)?),
            },
            Self::STATE_CONSUMED_UNAUTHENTICATED_LOCAL => {
                InputNoteState::ConsumedUnauthenticatedLocal {
                    nullifier_block_num: read_block_num(reader)?,
                    consumer_transaction: TransactionId(read_digest(reader)?),
                }
            }
            Self::STATE_CONSUMED_EXTERNAL => InputNoteState::ConsumedExternal {
                nullifier_block_num: read_block_num(reader)?,
            },
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognized input note state discriminant {other}"),
                ))
            }
        };
        Ok(state)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut reader = bytes;
        let state = Self::read_from(&mut reader)
            .map_err(|e| StoreError::CorruptedData(format!("malformed input note state: {e}")))?;
        if !reader.is_empty() {
            return Err(StoreError::CorruptedData(
                "trailing bytes after input note state".into(),
            ));
        }
        Ok(state)
    }
}

// OUTPUT NOTE STATE
// ================================================================================================

/// The state machine of a note produced by a local transaction.
///
/// Discriminant mapping: 0 Expected, 1 Committed, 2 Consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputNoteState {
    /// Produced locally and not yet seen in a block.
    Expected,
    /// Included in the chain at the given block.
    Committed { block_num: BlockNumber },
    /// The note's nullifier was observed on chain.
    Consumed { block_num: BlockNumber },
}

impl OutputNoteState {
    pub const STATE_EXPECTED: u8 = 0;
    pub const STATE_COMMITTED: u8 = 1;
    pub const STATE_CONSUMED: u8 = 2;

    pub fn discriminant(&self) -> u8 {
        match self {
            OutputNoteState::Expected => Self::STATE_EXPECTED,
            OutputNoteState::Committed { .. } => Self::STATE_COMMITTED,
            OutputNoteState::Consumed { .. } => Self::STATE_CONSUMED,
        }
    }

    pub(crate) fn write_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self.discriminant())?;
        match self {
            OutputNoteState::Expected => {}
            OutputNoteState::Committed { block_num } | OutputNoteState::Consumed { block_num } => {
                writer.write_u32::<LittleEndian>(block_num.as_u32())?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.write_into(&mut buffer)
            .expect("writing to a Vec cannot fail");
        buffer
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let discriminant = reader.read_u8()?;
        let state = match discriminant {
            Self::STATE_EXPECTED => OutputNoteState::Expected,
            Self::STATE_COMMITTED => OutputNoteState::Committed {
                block_num: read_block_num(reader)?,
            },
            Self::STATE_CONSUMED => OutputNoteState::Consumed {
                block_num: read_block_num(reader)?,
            },
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognized output note state discriminant {other}"),
                ))
            }
        };
        Ok(state)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut reader = bytes;
        let state = Self::read_from(&mut reader)
            .map_err(|e| StoreError::CorruptedData(format!("malformed output note state: {e}")))?;
        if !reader.is_empty() {
            return Err(StoreError::CorruptedData(
                "trailing bytes after output note state".into(),
            ));
        }
        Ok(state)
    }
}

fn read_block_num<R: Read>(reader: &mut R) -> io::Result<BlockNumber> {
    reader.read_u32::<LittleEndian>().map(BlockNumber::from_u32)
}

fn read_digest<R: Read>(reader: &mut R) -> io::Result<Digest> {
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes)?;
    Ok(Digest::new(bytes))
}

// NOTE RECORDS
// ================================================================================================

/// A received or consumable note tracked by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputNoteRecord {
    pub id: NoteId,
    /// The serialized asset vector, opaque at this layer.
    pub assets: Vec<u8>,
    pub serial_number: Word,
    /// The serialized note inputs, opaque at this layer.
    pub inputs: Vec<u8>,
    pub script: NoteScript,
    pub nullifier: Nullifier,
    pub state: InputNoteState,
    /// Seconds since the Unix epoch at which the client first saw the note.
    pub created_at: u64,
}

/// A note produced by one of the client's transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNoteRecord {
    pub id: NoteId,
    pub recipient_digest: Digest,
    /// The serialized asset vector, opaque at this layer.
    pub assets: Vec<u8>,
    /// The serialized note metadata, opaque at this layer.
    pub metadata: Vec<u8>,
    /// Known only once the full note details are available.
    pub nullifier: Option<Nullifier>,
    /// The height by which the note is expected to appear on chain.
    pub expected_height: BlockNumber,
    pub state: OutputNoteState,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{InputNoteState, OutputNoteState};
    use crate::error::StoreError;
    use crate::model::{BlockNumber, Digest, TransactionId};

    #[test]
    fn input_note_state_survives_encoding() {
        let state = InputNoteState::ProcessingAuthenticated {
            consumer_transaction: TransactionId(Digest::new([9u8; 32])),
            submission_height: BlockNumber::from_u32(42),
        };
        let decoded = InputNoteState::from_bytes(&state.to_bytes()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(
            decoded.discriminant(),
            InputNoteState::STATE_PROCESSING_AUTHENTICATED
        );
    }

    #[test]
    fn unknown_discriminant_is_corrupted_data() {
        assert_matches!(
            InputNoteState::from_bytes(&[250]),
            Err(StoreError::CorruptedData(_))
        );
        assert_matches!(
            OutputNoteState::from_bytes(&[250]),
            Err(StoreError::CorruptedData(_))
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = InputNoteState::Expected.to_bytes();
        bytes.push(0);
        assert_matches!(
            InputNoteState::from_bytes(&bytes),
            Err(StoreError::CorruptedData(_))
        );
    }
}
