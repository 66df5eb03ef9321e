//! Error types for the ledger boundary.

use thiserror::Error;

/// Errors that can occur while reading a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger location does not exist
    #[error("Ledger not found: {0}")]
    NotFound(String),

    /// Identity has no chain in this ledger
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// Underlying store failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Stored record could not be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl LedgerError {
    /// Creates an unknown-identity error.
    pub fn unknown(identity: impl std::fmt::Display) -> Self {
        Self::UnknownIdentity(identity.to_string())
    }

    /// Creates a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }
}
