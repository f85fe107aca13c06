//! In-memory store backend.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    crypto::Cryptor,
    error::{Result, StoreError},
    record::Email,
    row::EmailRow,
    store::Store,
    types::EmailId,
};

/// In-memory store implementation.
///
/// Rows live in a `HashMap` behind an `RwLock`; `claim_sending` takes the
/// write lock for the whole read-check-update, which makes it atomic within
/// the process. Primarily intended for tests and transient queues; nothing
/// survives a restart.
///
/// An optional capacity bound makes write operations fail once reached,
/// which keeps an accidentally production-deployed memory store from
/// exhausting memory and lets tests exercise capacity errors.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<RwLock<HashMap<EmailId, EmailRow>>>,
    cryptor: Option<Cryptor>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create an empty store with unlimited capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that refuses inserts beyond `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Encrypt sensitive fields at rest with the given cryptor.
    #[must_use]
    pub fn with_cryptor(mut self, cryptor: Cryptor) -> Self {
        self.cryptor = Some(cryptor);
        self
    }

    /// Number of rows currently stored.
    ///
    /// # Panics
    /// Never panics; a poisoned lock is recovered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw stored row for a record, for tests that need to look at the
    /// persisted (possibly ciphertext) representation.
    #[must_use]
    pub fn raw_row(&self, id: &EmailId) -> Option<EmailRow> {
        self.rows
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, email: Email) -> Result<Email> {
        let row = EmailRow::encode(&email, self.cryptor.as_ref())?;
        let mut rows = self.rows.write()?;

        if let Some(capacity) = self.capacity
            && !rows.contains_key(&row.id)
            && rows.len() >= capacity
        {
            return Err(StoreError::Internal(format!(
                "memory store capacity exceeded: {}/{capacity} records",
                rows.len()
            )));
        }

        let stored = row.decode(self.cryptor.as_ref());
        rows.insert(row.id, row);

        Ok(stored)
    }

    async fn get(&self, id: &EmailId) -> Result<Email> {
        self.rows
            .read()?
            .get(id)
            .map(|row| row.decode(self.cryptor.as_ref()))
            .ok_or(StoreError::NotFound(*id))
    }

    async fn select_queue(&self, max_attempts: u32, limit: usize) -> Result<Vec<Email>> {
        let now = Utc::now();
        let rows = self.rows.read()?;

        let mut eligible: Vec<&EmailRow> = rows
            .values()
            .filter(|row| row.is_eligible(max_attempts, now))
            .collect();
        eligible.sort_by_key(|row| (row.created_at, row.id));
        eligible.truncate(limit);

        Ok(eligible
            .into_iter()
            .map(|row| row.decode(self.cryptor.as_ref()))
            .collect())
    }

    async fn select_failed(&self, id: Option<EmailId>) -> Result<Vec<Email>> {
        let rows = self.rows.read()?;

        let mut failed: Vec<&EmailRow> = rows
            .values()
            .filter(|row| {
                row.failed
                    && row.sent_at.is_none()
                    && row.deleted_at.is_none()
                    && id.is_none_or(|id| row.id == id)
            })
            .collect();
        failed.sort_by_key(|row| (row.created_at, row.id));

        Ok(failed
            .into_iter()
            .map(|row| row.decode(self.cryptor.as_ref()))
            .collect())
    }

    async fn claim_sending(&self, id: &EmailId) -> Result<Option<Email>> {
        let mut rows = self.rows.write()?;

        let Some(row) = rows.get_mut(id) else {
            return Ok(None);
        };

        if row.sending || row.sent_at.is_some() {
            return Ok(None);
        }

        row.sending = true;
        row.attempts += 1;
        row.updated_at = Utc::now();

        Ok(Some(row.decode(self.cryptor.as_ref())))
    }

    async fn mark_sent(&self, id: &EmailId) -> Result<()> {
        let mut rows = self.rows.write()?;
        let row = rows.get_mut(id).ok_or(StoreError::NotFound(*id))?;

        let now = Utc::now();
        row.sending = false;
        row.sent_at = Some(now);
        row.failed = false;
        row.error = None;
        row.updated_at = now;

        Ok(())
    }

    async fn record_failure(&self, id: &EmailId, error: &str, exhausted: bool) -> Result<()> {
        let mut rows = self.rows.write()?;
        let row = rows.get_mut(id).ok_or(StoreError::NotFound(*id))?;

        row.sending = false;
        row.error = Some(error.to_string());
        if exhausted {
            row.failed = true;
        }
        row.updated_at = Utc::now();

        Ok(())
    }

    async fn soft_delete(&self, id: &EmailId) -> Result<()> {
        let mut rows = self.rows.write()?;
        let row = rows.get_mut(id).ok_or(StoreError::NotFound(*id))?;

        let now = Utc::now();
        row.deleted_at = Some(now);
        row.updated_at = now;

        Ok(())
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.rows.write()?;
        let before = rows.len();

        rows.retain(|_, row| {
            let terminal = row.sent_at.is_some() || row.failed || row.deleted_at.is_some();
            !(terminal && row.created_at < older_than)
        });

        Ok(before - rows.len())
    }

    async fn release_stale(&self, stuck_for: Duration) -> Result<usize> {
        let cutoff = Utc::now() - stuck_for;
        let mut rows = self.rows.write()?;
        let mut released = 0;

        for row in rows.values_mut() {
            if row.sending && row.sent_at.is_none() && row.updated_at < cutoff {
                row.sending = false;
                row.updated_at = Utc::now();
                released += 1;
            }
        }

        Ok(released)
    }
}
