//! Durable storage for queued e-mail records.
//!
//! This crate owns the Message Record ([`record::Email`]), its stored
//! representation ([`row::EmailRow`]), encryption at rest, and the
//! [`store::Store`] trait with its memory and file backends. The store is
//! the single source of truth for the send/retry lifecycle; all concurrency
//! control is pushed down into the atomic `claim_sending` transition.

pub mod backends;
pub mod config;
pub mod crypto;
pub mod error;
pub mod record;
pub mod row;
pub mod store;
pub mod types;

pub use backends::{FileStore, MemoryStore};
pub use config::StoreConfig;
pub use crypto::{Cryptor, CryptoError};
pub use error::{Result, StoreError};
pub use record::{Attachment, Email};
pub use store::Store;
pub use types::EmailId;
