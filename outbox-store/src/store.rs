//! The storage abstraction every other component talks to.
//!
//! The store is the single source of truth for record state. There is no
//! other shared state anywhere in the engine: cross-process and cross-cycle
//! coordination happens entirely through [`Store::claim_sending`], which
//! backends must implement as a single atomic compare-and-swap.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{error::Result, record::Email, types::EmailId};

/// Durable storage for queued e-mail records.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Persist a new record and return the stored copy.
    async fn insert(&self, email: Email) -> Result<Email>;

    /// Fetch one record by id.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if no
    /// such record exists.
    async fn get(&self, id: &EmailId) -> Result<Email>;

    /// All records eligible to send right now, oldest first, at most
    /// `limit` of them.
    ///
    /// A record is eligible when it is not soft-deleted, not sent, not
    /// failed, not mid-send, has attempts left, and its scheduled time (if
    /// any) has passed. The bound keeps one cycle's blast radius and the
    /// provider rate under control.
    async fn select_queue(&self, max_attempts: u32, limit: usize) -> Result<Vec<Email>>;

    /// All terminally failed, unsent, not-deleted records, optionally
    /// narrowed to one id. Used by manual retry tooling, never by the
    /// automatic cycle.
    async fn select_failed(&self, id: Option<EmailId>) -> Result<Vec<Email>>;

    /// Atomically transition a record to `sending = true`,
    /// `attempts += 1`.
    ///
    /// Returns the updated record, or `None` when the record is already
    /// mid-send, already sent, or gone, in which case the caller must not
    /// deliver it. This is the sole concurrency-control primitive: two
    /// overlapping cycles can both read the same record, but only one
    /// claim succeeds.
    async fn claim_sending(&self, id: &EmailId) -> Result<Option<Email>>;

    /// Record a successful delivery: clears `sending`, stamps `sent_at`,
    /// and wipes any earlier failure state so the terminal record is clean.
    async fn mark_sent(&self, id: &EmailId) -> Result<()>;

    /// Record a failed attempt: clears `sending` and captures the error.
    /// When `exhausted` is set the record becomes terminally failed.
    async fn record_failure(&self, id: &EmailId, error: &str, exhausted: bool) -> Result<()>;

    /// Soft-delete a record. It stays on disk for the audit trail until
    /// pruned.
    async fn soft_delete(&self, id: &EmailId) -> Result<()>;

    /// Remove terminal (sent, failed, or soft-deleted) records created
    /// before `older_than`. Returns how many were removed.
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<usize>;

    /// Operator repair: unlock records stuck in `sending = true` for longer
    /// than `stuck_for` with no terminal state, which happens when a worker
    /// crashes between claiming and completing. Returns how many were
    /// unlocked.
    async fn release_stale(&self, stuck_for: Duration) -> Result<usize>;
}
