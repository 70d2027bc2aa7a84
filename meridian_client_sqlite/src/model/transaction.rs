//! Transaction records and their status machine.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::StoreError;
use crate::model::{BlockNumber, Digest, TransactionId};

/// A transaction script, deduplicated across transactions by its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionScript {
    pub root: Digest,
    pub script: Vec<u8>,
}

/// Why a pending transaction was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardCause {
    /// The transaction's expiration height passed without inclusion.
    Expired,
    /// One of its input notes was consumed by another transaction.
    InputConsumed,
}

impl DiscardCause {
    fn code(self) -> u8 {
        match self {
            DiscardCause::Expired => 0,
            DiscardCause::InputConsumed => 1,
        }
    }

    fn from_code(code: u8) -> io::Result<Self> {
        match code {
            0 => Ok(DiscardCause::Expired),
            1 => Ok(DiscardCause::InputConsumed),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unrecognized discard cause {other}"),
            )),
        }
    }
}

/// The status machine of a locally executed transaction.
///
/// Variant mapping (also materialized in the `status_variant` column):
/// 0 Pending, 1 Committed, 2 Discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Submitted, not yet observed in a block.
    Pending,
    /// Included in the chain at the given block.
    Committed { block_num: BlockNumber },
    /// Abandoned and never to be included.
    Discarded { cause: DiscardCause },
}

impl TransactionStatus {
    pub const VARIANT_PENDING: u8 = 0;
    pub const VARIANT_COMMITTED: u8 = 1;
    pub const VARIANT_DISCARDED: u8 = 2;

    pub fn variant(&self) -> u8 {
        match self {
            TransactionStatus::Pending => Self::VARIANT_PENDING,
            TransactionStatus::Committed { .. } => Self::VARIANT_COMMITTED,
            TransactionStatus::Discarded { .. } => Self::VARIANT_DISCARDED,
        }
    }

    /// Committed and discarded transactions never change status again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub(crate) fn write_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(self.variant())?;
        match self {
            TransactionStatus::Pending => {}
            TransactionStatus::Committed { block_num } => {
                writer.write_u32::<LittleEndian>(block_num.as_u32())?;
            }
            TransactionStatus::Discarded { cause } => {
                writer.write_u8(cause.code())?;
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
        let variant = reader.read_u8()?;
        let status = match variant {
            Self::VARIANT_PENDING => TransactionStatus::Pending,
            Self::VARIANT_COMMITTED => TransactionStatus::Committed {
                block_num: BlockNumber::from_u32(reader.read_u32::<LittleEndian>()?),
            },
            Self::VARIANT_DISCARDED => TransactionStatus::Discarded {
                cause: DiscardCause::from_code(reader.read_u8()?)?,
            },
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unrecognized transaction status variant {other}"),
                ))
            }
        };
        Ok(status)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut reader = bytes;
        let status = Self::read_from(&mut reader)
            .map_err(|e| StoreError::CorruptedData(format!("malformed transaction status: {e}")))?;
        if !reader.is_empty() {
            return Err(StoreError::CorruptedData(
                "trailing bytes after transaction status".into(),
            ));
        }
        Ok(status)
    }
}

/// A transaction tracked by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    /// The serialized transaction details, opaque at this layer.
    pub details: Vec<u8>,
    pub script: Option<TransactionScript>,
    /// The block the transaction was executed against.
    pub block_num: BlockNumber,
    pub status: TransactionStatus,
}
