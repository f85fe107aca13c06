//! Store backend selection via configuration.

use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{FileStore, MemoryStore},
    crypto::Cryptor,
    error::Result,
    store::Store,
};

/// Which backend to persist records in.
///
/// In the TOML configuration file:
///
/// ```toml
/// [store]
/// type = "File"
/// path = "/var/spool/outbox"
/// ```
///
/// or, for tests and development:
///
/// ```toml
/// [store]
/// type = "Memory"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// File-per-record storage (production).
    File {
        /// Directory the rows live in.
        path: PathBuf,
    },
    /// In-memory storage (testing/development), optionally bounded.
    Memory {
        /// Maximum number of records to hold (omit for unlimited).
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/spool/outbox"),
        }
    }
}

impl StoreConfig {
    /// Build and initialise the configured backend.
    ///
    /// # Errors
    /// Returns an error if the file store path is invalid or the directory
    /// cannot be prepared.
    pub fn into_store(self, cryptor: Option<Cryptor>) -> Result<Arc<dyn Store>> {
        match self {
            Self::File { path } => {
                let store = FileStore::new(path, cryptor)?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory { capacity } => {
                let store = capacity.map_or_else(MemoryStore::new, MemoryStore::with_capacity);
                Ok(Arc::new(match cryptor {
                    Some(cryptor) => store.with_cryptor(cryptor),
                    None => store,
                }))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_both_variants() {
        let file: StoreConfig = toml::from_str(
            r#"
            type = "File"
            path = "/var/spool/outbox"
            "#,
        )
        .expect("valid file config");
        assert!(matches!(file, StoreConfig::File { .. }));

        let memory: StoreConfig = toml::from_str(
            r#"
            type = "Memory"
            capacity = 100
            "#,
        )
        .expect("valid memory config");
        assert!(matches!(
            memory,
            StoreConfig::Memory {
                capacity: Some(100)
            }
        ));
    }

    #[test]
    fn default_is_a_file_store() {
        assert!(matches!(StoreConfig::default(), StoreConfig::File { .. }));
    }
}
