//! Error types for the store crate.

use thiserror::Error;

use crate::{crypto::CryptoError, types::EmailId};

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row serialization failed.
    #[error("row encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Row deserialization failed (corrupted data).
    #[error("row decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Field encoding failed.
    #[error("field encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(EmailId),

    /// Store directory validation failed.
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    /// Internal error (lock poisoning, capacity, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// Convenience conversion for lock poisoning
impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {e}"))
    }
}
