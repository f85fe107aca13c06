//! The queue runner: one bounded processing cycle per invocation.

use std::{fmt, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use outbox_common::{address::format_address_map, config::Config};
use outbox_store::{Email, EmailId, Store};

use crate::{
    error::DeliveryError,
    sender::{SendOutcome, Sender},
};

/// Outcome of one record within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Delivered.
    Sent,
    /// The attempt failed with the recorded error.
    Failed(String),
    /// Another worker got there first, or the record was already sent.
    Skipped,
    /// The cycle's wall-clock budget ran out before this record.
    Deferred,
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "OK"),
            Self::Failed(error) => write!(f, "Failed: {error}"),
            Self::Skipped => write!(f, "Skipped"),
            Self::Deferred => write!(f, "Deferred"),
        }
    }
}

/// One line of the cycle report.
#[derive(Debug, Clone)]
pub struct CycleEntry {
    pub id: EmailId,
    pub recipients: String,
    pub subject: String,
    pub outcome: RecordOutcome,
}

/// Operator-facing summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    /// Per-record outcomes, in selection order.
    pub entries: Vec<CycleEntry>,
    /// Whether the cycle stopped early on its wall-clock budget.
    pub budget_exhausted: bool,
}

impl CycleSummary {
    /// Number of records delivered this cycle.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Sent))
    }

    /// Number of records that failed this cycle.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Failed(_)))
    }

    /// Number of records deferred past the budget.
    #[must_use]
    pub fn deferred(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Deferred))
    }

    /// Whether the cycle had nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn count(&self, matches: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches(&entry.outcome))
            .count()
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "There is nothing to send.");
        }

        for entry in &self.entries {
            writeln!(
                f,
                "{}  {}  {}  {}",
                entry.id, entry.recipients, entry.subject, entry.outcome
            )?;
        }
        write!(
            f,
            "{} sent, {} failed, {} deferred",
            self.sent(),
            self.failed(),
            self.deferred()
        )
    }
}

/// Drives processing cycles and the operator maintenance operations.
#[derive(Debug, Clone)]
pub struct Runner {
    store: Arc<dyn Store>,
    sender: Sender,
    config: Config,
}

impl Runner {
    /// Assemble a runner.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sender: Sender, config: Config) -> Self {
        Self {
            store,
            sender,
            config,
        }
    }

    /// Run one processing cycle.
    ///
    /// Fetches the eligible batch, sends each record in FIFO order, and
    /// isolates per-record failures so one bad record never aborts the
    /// batch. Overlap protection needs nothing extra here: a concurrent
    /// cycle's selector simply will not return records this cycle has
    /// already claimed.
    ///
    /// # Errors
    /// Returns an error only when the selector query itself fails.
    pub async fn run_cycle(&self) -> Result<CycleSummary, DeliveryError> {
        let queue = self
            .store
            .select_queue(self.config.max_attempts(), self.config.limit)
            .await?;

        if queue.is_empty() {
            info!("there is nothing to send");
            return Ok(CycleSummary::default());
        }

        info!(count = queue.len(), "processing queue");

        let deadline = Instant::now() + self.config.cycle_budget();
        let mut summary = CycleSummary::default();
        let mut queue = queue.into_iter();

        while let Some(email) = queue.next() {
            if Instant::now() >= deadline {
                summary.budget_exhausted = true;
                let deferred: Vec<Email> = std::iter::once(email).chain(queue.by_ref()).collect();
                warn!(
                    deferred = deferred.len(),
                    "cycle budget exhausted, deferring remaining records"
                );
                for email in deferred {
                    summary.entries.push(entry(&email, RecordOutcome::Deferred));
                }
                break;
            }

            let outcome = match self.sender.send(&email).await {
                Ok(SendOutcome::Sent) => RecordOutcome::Sent,
                Ok(SendOutcome::AlreadySent | SendOutcome::Skipped) => RecordOutcome::Skipped,
                Ok(SendOutcome::Failed { error, .. }) => RecordOutcome::Failed(error),
                Err(e) => {
                    // The sender consumes delivery failures itself; an
                    // error escaping means the store misbehaved. Convert
                    // it to a failure mark and keep the batch moving.
                    error!(id = %email.id, error = %e, "send aborted");
                    let message = e.to_string();
                    if let Err(e) = self.store.record_failure(&email.id, &message, false).await {
                        error!(id = %email.id, error = %e, "could not record failure");
                    }
                    RecordOutcome::Failed(message)
                }
            };

            summary.entries.push(entry(&email, outcome));
        }

        info!(
            sent = summary.sent(),
            failed = summary.failed(),
            deferred = summary.deferred(),
            "cycle complete"
        );

        Ok(summary)
    }

    /// Re-queue failed records by creating fresh copies, optionally
    /// narrowed to one record. Returns the new records.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn retry_failed(&self, id: Option<EmailId>) -> Result<Vec<Email>, DeliveryError> {
        let failed = self.store.select_failed(id).await?;

        let mut retried = Vec::with_capacity(failed.len());
        for email in &failed {
            retried.push(self.sender.retry(email).await?);
        }

        Ok(retried)
    }

    /// Remove terminal records older than the configured retention window.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn prune(&self) -> Result<usize, DeliveryError> {
        let cutoff = Utc::now() - self.config.retention();

        Ok(self.store.prune(cutoff).await?)
    }

    /// Unlock records stuck in `sending` longer than `stuck_for`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn release_stale(&self, stuck_for: chrono::Duration) -> Result<usize, DeliveryError> {
        Ok(self.store.release_stale(stuck_for).await?)
    }
}

fn entry(email: &Email, outcome: RecordOutcome) -> CycleEntry {
    CycleEntry {
        id: email.id,
        recipients: format_address_map(&email.recipient),
        subject: email.subject.clone(),
        outcome,
    }
}
