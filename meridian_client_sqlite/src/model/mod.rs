//! The data model mirrored by the store.
//!
//! Identifiers and commitments are fixed-width byte newtypes stored as
//! BLOB columns; block numbers and MMR positions are integer newtypes.
//! Opaque payloads that this layer never interprets (serialized block
//! headers, account code, asset vectors, note metadata) stay `Vec<u8>`.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

pub mod account;
pub mod note;
pub mod sync;
pub mod transaction;

// DIGEST
// ================================================================================================

/// A 32-byte commitment digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digest([u8; 32]);

/// A single field-element word, e.g. an account seed or a storage value.
///
/// Words and digests share a representation at this layer.
pub type Word = Digest;

impl Digest {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl ToSql for Digest {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(&self.0[..]))
    }
}

impl FromSql for Digest {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        let bytes: [u8; 32] = blob.try_into().map_err(|_| FromSqlError::InvalidBlobSize {
            expected_size: 32,
            blob_size: blob.len(),
        })?;
        Ok(Digest(bytes))
    }
}

// ACCOUNT ID
// ================================================================================================

/// The 16-byte identifier of a Meridian account.
///
/// The first eight bytes form the id prefix, which doubles as the faucet
/// prefix carried on vault asset rows.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId([u8; 16]);

impl AccountId {
    pub const fn new(bytes: [u8; 16]) -> Self {
        AccountId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The big-endian integer value of the first eight id bytes.
    pub fn prefix(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl ToSql for AccountId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(&self.0[..]))
    }
}

impl FromSql for AccountId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        let bytes: [u8; 16] = blob.try_into().map_err(|_| FromSqlError::InvalidBlobSize {
            expected_size: 16,
            blob_size: blob.len(),
        })?;
        Ok(AccountId(bytes))
    }
}

// DIGEST-BACKED IDENTIFIERS
// ================================================================================================

macro_rules! digest_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub Digest);

        impl $name {
            pub fn inner(&self) -> Digest {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                self.0.as_bytes()
            }
        }

        impl From<Digest> for $name {
            fn from(digest: Digest) -> Self {
                $name(digest)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                Digest::column_result(value).map($name)
            }
        }
    };
}

digest_newtype!(
    /// The unique identifier of a note, derived from its contents.
    NoteId
);
digest_newtype!(
    /// A derived value marking a note as spent.
    Nullifier
);
digest_newtype!(
    /// The unique identifier of an executed transaction.
    TransactionId
);

// BLOCK NUMBER
// ================================================================================================

/// A position in the rollup chain.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct BlockNumber(u32);

impl BlockNumber {
    /// The genesis block.
    pub const GENESIS: Self = BlockNumber(0);

    pub const fn from_u32(value: u32) -> Self {
        BlockNumber(value)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for BlockNumber {
    fn from(value: u32) -> Self {
        BlockNumber(value)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for BlockNumber {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

impl FromSql for BlockNumber {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        u32::column_result(value).map(BlockNumber)
    }
}

// IN-ORDER INDEX
// ================================================================================================

/// An in-order position inside the partial MMR over block commitments.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct InOrderIndex(u64);

impl InOrderIndex {
    pub const fn from_u64(value: u64) -> Self {
        InOrderIndex(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for InOrderIndex {
    fn from(value: u64) -> Self {
        InOrderIndex(value)
    }
}

impl fmt::Display for InOrderIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for InOrderIndex {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = i64::try_from(self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for InOrderIndex {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        u64::try_from(raw)
            .map(InOrderIndex)
            .map_err(|_| FromSqlError::OutOfRange(raw))
    }
}

// NOTE TAG
// ================================================================================================

/// A fuzzy filter value used to select sync-relevant traffic from the node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NoteTag(u32);

impl NoteTag {
    pub const fn from_u32(value: u32) -> Self {
        NoteTag(value)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for NoteTag {
    fn from(value: u32) -> Self {
        NoteTag(value)
    }
}

impl fmt::Display for NoteTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for NoteTag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

impl FromSql for NoteTag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        u32::column_result(value).map(NoteTag)
    }
}

// BLOCK HEADER RECORD
// ================================================================================================

/// A block header row together with the MMR peaks at its height and the
/// retention hint that marks it as carrying client-relevant notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderRecord {
    pub block_num: BlockNumber,
    /// The serialized block header, opaque at this layer.
    pub header: Vec<u8>,
    /// Serialized MMR peaks of the partial blockchain at this height.
    pub partial_blockchain_peaks: Vec<u8>,
    pub has_client_notes: bool,
}

#[cfg(test)]
mod tests {
    use super::{AccountId, Digest};

    #[test]
    fn digests_display_as_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let digest = Digest::new(bytes);
        let rendered = digest.to_string();
        assert!(rendered.starts_with("0xab00"));
        assert!(rendered.ends_with("01"));
    }

    #[test]
    fn account_id_prefix_is_big_endian() {
        let mut bytes = [0u8; 16];
        bytes[7] = 0x2a;
        assert_eq!(AccountId::new(bytes).prefix(), 0x2a);
    }

    #[test]
    fn digest_sql_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v BLOB NOT NULL)", []).unwrap();
        let digest = Digest::new([7u8; 32]);
        conn.execute("INSERT INTO t (v) VALUES (?1)", rusqlite::params![digest])
            .unwrap();
        let read: Digest = conn
            .query_row("SELECT v FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(read, digest);
    }
}
