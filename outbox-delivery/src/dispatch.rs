//! Asynchronous dispatch: hand a persisted record to a background executor
//! instead of waiting for the next runner cycle.
//!
//! A job carries only the record id; the record itself is the durable
//! state, and the worker re-reads it at execution time so a job replayed
//! after the record was sent is a clean no-op.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use outbox_store::{EmailId, Store};

use crate::{error::DeliveryError, sender::Sender};

/// A dispatchable unit of work: send one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendJob {
    /// The record to send.
    pub email_id: EmailId,
}

/// Routing hints for the executing facility.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Named connection of the executing facility.
    pub connection: Option<String>,
    /// Named queue on that connection.
    pub queue: Option<String>,
    /// Hold the job for this long before executing it.
    pub delay: Option<Duration>,
}

/// An asynchronous execution facility for send jobs.
///
/// `enqueue` must return without blocking on delivery. External brokers
/// implement this against their own queueing; [`TokioDispatcher`] is the
/// in-process implementation.
#[async_trait]
pub trait Dispatcher: Send + Sync + std::fmt::Debug {
    /// Accept a job for later execution.
    ///
    /// # Errors
    /// Returns an error if the job cannot be accepted.
    async fn enqueue(&self, job: SendJob, options: DispatchOptions) -> Result<(), DeliveryError>;
}

/// In-process dispatcher: runs each job on a spawned tokio task.
///
/// Connection and queue hints are recorded in the logs but do not route
/// anywhere; there is only one executor in-process.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    store: Arc<dyn Store>,
    sender: Sender,
}

impl TokioDispatcher {
    /// Assemble a dispatcher.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sender: Sender) -> Self {
        Self { store, sender }
    }
}

#[async_trait]
impl Dispatcher for TokioDispatcher {
    async fn enqueue(&self, job: SendJob, options: DispatchOptions) -> Result<(), DeliveryError> {
        debug!(
            id = %job.email_id,
            connection = options.connection.as_deref().unwrap_or("default"),
            queue = options.queue.as_deref().unwrap_or("default"),
            "dispatching send job"
        );

        let store = Arc::clone(&self.store);
        let sender = self.sender.clone();

        tokio::spawn(async move {
            if let Some(delay) = options.delay {
                tokio::time::sleep(delay).await;
            }

            match store.get(&job.email_id).await {
                Ok(email) => {
                    if let Err(e) = sender.send(&email).await {
                        error!(id = %job.email_id, error = %e, "dispatched send failed");
                    }
                }
                Err(e) => {
                    error!(id = %job.email_id, error = %e, "dispatched record unavailable");
                }
            }
        });

        Ok(())
    }
}
