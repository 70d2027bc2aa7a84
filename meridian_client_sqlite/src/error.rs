//! Error types for problems that may arise when reading or storing client data to SQLite.

use std::error;
use std::fmt;

use crate::model::{AccountId, NoteId};

/// The primary error type for the SQLite client store.
#[derive(Debug)]
pub enum StoreError {
    /// Decoding of a stored value from its serialized form has failed.
    CorruptedData(String),

    /// A key, foreign-key, or check constraint rejected a write.
    ConstraintViolation(String),

    /// The account referenced by the operation is not tracked by this store.
    AccountNotFound(AccountId),

    /// The note referenced by the operation is not present in the store.
    NoteNotFound(NoteId),

    /// An account state at nonce zero was provided without the seed that
    /// produced it.
    MissingAccountSeed(AccountId),

    /// Wrapper for rusqlite errors.
    Database(rusqlite::Error),

    /// Wrapper for errors from the IO subsystem.
    Io(std::io::Error),
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self {
            StoreError::Database(e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            StoreError::CorruptedData(reason) => {
                write!(f, "Client store is corrupted: {}", reason)
            }
            StoreError::ConstraintViolation(reason) => {
                write!(f, "A database constraint rejected the write: {}", reason)
            }
            StoreError::AccountNotFound(account_id) => {
                write!(f, "Account {} is not tracked by this store.", account_id)
            }
            StoreError::NoteNotFound(note_id) => {
                write!(f, "Note {} is not present in this store.", note_id)
            }
            StoreError::MissingAccountSeed(account_id) => write!(
                f,
                "Account {} is at nonce zero but no account seed was provided.",
                account_id
            ),
            StoreError::Database(e) => write!(f, "{}", e),
            StoreError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(f, msg)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(msg.unwrap_or_else(|| f.to_string()))
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}
