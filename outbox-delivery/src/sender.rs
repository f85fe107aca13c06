//! The send/retry state machine.
//!
//! One [`Sender::send`] call drives one attempt:
//! `pending → sending → {sent | pending | failed}`. Transport-level
//! problems never escape as errors: they are recorded into the record and
//! reported in the outcome. Only store failures propagate, because without
//! the store there is no state left to update.

use std::sync::Arc;

use tracing::{debug, info, warn};

use outbox_common::render::Renderer;
use outbox_store::{Email, EmailId, Store};

use crate::{
    attachments::AttachmentSource,
    envelope::Envelope,
    error::DeliveryError,
    transport::Transport,
};

/// What happened to one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered; the record is terminally sent.
    Sent,
    /// The record was already sent. Nothing was done: no attempt was
    /// consumed, no error recorded.
    AlreadySent,
    /// Another worker claimed the record first. Nothing was done.
    Skipped,
    /// The attempt failed; the error was recorded. `exhausted` means the
    /// record is now terminally failed.
    Failed {
        /// The recorded error text.
        error: String,
        /// Whether this was the final allowed attempt.
        exhausted: bool,
    },
}

/// Drives individual records through their send attempt.
#[derive(Debug, Clone)]
pub struct Sender {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    attachments: Arc<dyn AttachmentSource>,
    renderer: Arc<dyn Renderer>,
    max_attempts: u32,
}

impl Sender {
    /// Assemble a sender over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        attachments: Arc<dyn AttachmentSource>,
        renderer: Arc<dyn Renderer>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            transport,
            attachments,
            renderer,
            max_attempts,
        }
    }

    /// Attempt to deliver one record.
    ///
    /// Idempotent: an already-sent record is a no-op, and losing the claim
    /// race to a concurrent worker is a clean skip. The claim itself is the
    /// only concurrency control; once it succeeds, this worker owns the
    /// attempt.
    ///
    /// # Errors
    /// Returns an error only when the store fails; delivery failures are
    /// recorded and reported through [`SendOutcome::Failed`].
    pub async fn send(&self, email: &Email) -> Result<SendOutcome, DeliveryError> {
        if email.is_sent() {
            debug!(id = %email.id, "record already sent, skipping");
            return Ok(SendOutcome::AlreadySent);
        }

        let Some(mut claimed) = self.store.claim_sending(&email.id).await? else {
            debug!(id = %email.id, "record claimed elsewhere, skipping");
            return Ok(SendOutcome::Skipped);
        };

        // Composition materializes the body up front; render here only
        // when a record was stored with just its view.
        if claimed.body.is_empty()
            && let Some(view) = claimed.view.clone()
        {
            match self.renderer.render(&view, &claimed.variables) {
                Ok(body) => claimed.body = body,
                Err(e) => return self.fail(claimed.id, e.to_string(), claimed.attempts).await,
            }
        }

        // Attachment content is resolved per attempt; a reference that no
        // longer resolves consumes the attempt like any delivery failure.
        let mut attachments = Vec::with_capacity(claimed.attachments.len());
        for attachment in &claimed.attachments {
            match self.attachments.resolve(attachment).await {
                Ok(resolved) => attachments.push(resolved),
                Err(e) => return self.fail(claimed.id, e.to_string(), claimed.attempts).await,
            }
        }

        let envelope = match Envelope::build(&claimed, attachments) {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(claimed.id, e.to_string(), claimed.attempts).await,
        };

        match self.transport.deliver(&envelope).await {
            Ok(()) => {
                self.store.mark_sent(&claimed.id).await?;
                info!(id = %claimed.id, subject = %claimed.subject, "delivered");
                Ok(SendOutcome::Sent)
            }
            Err(e) => self.fail(claimed.id, e.to_string(), claimed.attempts).await,
        }
    }

    /// Create a fresh record to retry a failed one.
    ///
    /// The new record copies the user-facing fields and starts its
    /// lifecycle from zero; the failed record is left untouched so the
    /// audit trail keeps every generation.
    ///
    /// # Errors
    /// Returns an error if the store rejects the insert.
    pub async fn retry(&self, failed: &Email) -> Result<Email, DeliveryError> {
        let stored = self.store.insert(failed.retry_copy()).await?;
        info!(original = %failed.id, retry = %stored.id, "created retry record");

        Ok(stored)
    }

    /// Record a failed attempt. `failed` goes terminal eagerly on the
    /// final attempt so `select_failed` sees an explicit state rather than
    /// inferring exhaustion from the attempt count.
    async fn fail(
        &self,
        id: EmailId,
        error: String,
        attempts: u32,
    ) -> Result<SendOutcome, DeliveryError> {
        let exhausted = attempts >= self.max_attempts;
        self.store.record_failure(&id, &error, exhausted).await?;

        warn!(id = %id, attempts, exhausted, error = %error, "delivery attempt failed");

        Ok(SendOutcome::Failed { error, exhausted })
    }
}
