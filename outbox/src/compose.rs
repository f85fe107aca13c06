//! The e-mail composer: a builder that accumulates plain data and persists
//! it through a single terminal `send()`.
//!
//! `send()` runs an explicit pipeline (validate, prepare, persist, then
//! the configured after-persist action), each stage a plain function over
//! the accumulated [`ComposeData`]. Nothing is written until validation
//! has passed, and nothing is mutated after persistence.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use outbox_common::{
    address::{AddressMap, NamedAddress},
    config::Config,
    render::{RenderError, Renderer},
};
use outbox_delivery::{DeliveryError, DispatchOptions, Dispatcher, SendJob};
use outbox_store::{Attachment, Email, StoreError};

use crate::{
    controller::Outbox,
    mailable::Mailable,
    validate::{ValidationError, parse_schedule, validate},
};

/// Errors surfaced by `send()`.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The composition was rejected before anything was persisted.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Rendering the body failed; nothing was persisted.
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// The store rejected the record.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Immediate delivery or dispatch failed after the record was
    /// persisted. The record exists and stays eligible for the runner.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// When to allow sending: an absolute instant, or a string to be parsed as
/// one at validation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// An absolute instant.
    At(DateTime<Utc>),
    /// An unparsed timestamp string.
    Raw(String),
}

impl From<DateTime<Utc>> for Schedule {
    fn from(at: DateTime<Utc>) -> Self {
        Self::At(at)
    }
}

impl From<&str> for Schedule {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<String> for Schedule {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

/// The accumulated compose state. Plain data, no behaviour.
#[derive(Debug, Clone, Default)]
pub struct ComposeData {
    pub(crate) label: Option<String>,
    pub(crate) recipient: AddressMap,
    pub(crate) cc: AddressMap,
    pub(crate) bcc: AddressMap,
    pub(crate) reply_to: AddressMap,
    pub(crate) from: Option<NamedAddress>,
    pub(crate) subject: Option<String>,
    pub(crate) view: Option<String>,
    pub(crate) variables: Option<Value>,
    pub(crate) body: Option<String>,
    pub(crate) attachments: Vec<Attachment>,
    pub(crate) scheduled: Option<Schedule>,
    pub(crate) queued: Option<DispatchOptions>,
}

/// Builder for one outgoing e-mail.
///
/// Setters only store their field; every rule is checked in `send()`.
#[derive(Debug, Clone)]
pub struct EmailComposer<'a> {
    outbox: &'a Outbox,
    data: ComposeData,
}

impl<'a> EmailComposer<'a> {
    pub(crate) fn new(outbox: &'a Outbox) -> Self {
        Self {
            outbox,
            data: ComposeData::default(),
        }
    }

    /// Tag the record with a free-form label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    /// Add a primary recipient.
    #[must_use]
    pub fn recipient(mut self, address: impl Into<String>) -> Self {
        self.data.recipient.insert(address.into(), None);
        self
    }

    /// Add a primary recipient with a display name.
    #[must_use]
    pub fn recipient_named(
        mut self,
        address: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.data.recipient.insert(address.into(), Some(name.into()));
        self
    }

    /// Add a carbon-copy recipient.
    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.data.cc.insert(address.into(), None);
        self
    }

    /// Add a carbon-copy recipient with a display name.
    #[must_use]
    pub fn cc_named(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.data.cc.insert(address.into(), Some(name.into()));
        self
    }

    /// Add a blind-carbon-copy recipient.
    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.data.bcc.insert(address.into(), None);
        self
    }

    /// Add a blind-carbon-copy recipient with a display name.
    #[must_use]
    pub fn bcc_named(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.data.bcc.insert(address.into(), Some(name.into()));
        self
    }

    /// Add a reply-to address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.data.reply_to.insert(address.into(), None);
        self
    }

    /// Add a reply-to address with a display name.
    #[must_use]
    pub fn reply_to_named(
        mut self,
        address: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.data.reply_to.insert(address.into(), Some(name.into()));
        self
    }

    /// Set the sender. Falls back to the configured system-wide sender
    /// when unset.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.data.from = Some(NamedAddress::new(address));
        self
    }

    /// Set the sender with a display name.
    #[must_use]
    pub fn from_named(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.data.from = Some(NamedAddress::with_name(address, name));
        self
    }

    /// Set the subject line.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.data.subject = Some(subject.into());
        self
    }

    /// Set the view (template identifier) the body is rendered from.
    #[must_use]
    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.data.view = Some(view.into());
        self
    }

    /// Set the template variables. Must be a JSON object; anything else is
    /// rejected at `send()`.
    #[must_use]
    pub fn variables(mut self, variables: Value) -> Self {
        self.data.variables = Some(variables);
        self
    }

    /// Supply pre-rendered content instead of a view.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.data.body = Some(body.into());
        self
    }

    /// Add one attachment reference.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.data.attachments.push(attachment);
        self
    }

    /// Replace the attachment list.
    #[must_use]
    pub fn attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.data.attachments = attachments;
        self
    }

    /// Read a structured message description into the composer, replacing
    /// envelope, content, and attachments. The result goes through exactly
    /// the same validation and preparation as manual field-setting.
    #[must_use]
    pub fn mailable(mut self, mailable: Mailable) -> Self {
        self.data.recipient = mailable.to;
        self.data.cc = mailable.cc;
        self.data.bcc = mailable.bcc;
        self.data.reply_to = mailable.reply_to;
        if mailable.from.is_some() {
            self.data.from = mailable.from;
        }
        if mailable.subject.is_some() {
            self.data.subject = mailable.subject;
        }
        self.data.view = mailable.view;
        if !mailable.variables.is_empty() {
            self.data.variables = Some(Value::Object(mailable.variables));
        }
        self.data.body = mailable.body;
        self.data.attachments = mailable.attachments;
        self
    }

    /// Schedule the record: no sending before `at`, then persist it.
    ///
    /// # Errors
    /// See [`EmailComposer::send`].
    pub async fn later(mut self, at: impl Into<Schedule>) -> Result<Email, ComposeError> {
        self.data.scheduled = Some(at.into());
        self.send().await
    }

    /// Persist the record and hand it to the asynchronous dispatcher,
    /// returning without blocking on delivery.
    ///
    /// # Errors
    /// See [`EmailComposer::send`].
    pub async fn queue(mut self, options: DispatchOptions) -> Result<Email, ComposeError> {
        self.data.queued = Some(options);
        self.send().await
    }

    /// Validate, prepare, and persist the record, then run the configured
    /// after-persist action: dispatch it, send it immediately, or leave it
    /// pending for the next runner cycle.
    ///
    /// Returns the persisted record as the store sees it.
    ///
    /// # Errors
    /// Returns [`ComposeError`] if validation, rendering, persistence, or
    /// the after-persist action fails. Validation and render failures
    /// leave no record behind.
    pub async fn send(self) -> Result<Email, ComposeError> {
        let Self { outbox, data } = self;

        validate(&data, outbox.renderer())?;

        let queued = data.queued.clone();
        let email = prepare(data, outbox.config(), outbox.renderer())?;
        let email = outbox.store().insert(email).await?;

        debug!(id = %email.id, "composed record persisted");

        if let Some(options) = queued {
            outbox
                .dispatcher()
                .enqueue(SendJob { email_id: email.id }, options)
                .await?;
            return Ok(email);
        }

        if outbox.config().send_immediately {
            outbox.sender().send(&email).await?;
            return Ok(outbox.store().get(&email.id).await?);
        }

        Ok(email)
    }
}

/// Turn validated compose data into a pending record.
///
/// Testing-mode redirection happens here, after validation (so malformed
/// input is still rejected), replacing the recipient with the configured
/// test inbox and clearing cc/bcc.
fn prepare(
    data: ComposeData,
    config: &Config,
    renderer: &dyn Renderer,
) -> Result<Email, ComposeError> {
    let mut email = Email::new();

    email.label = data.label;

    if config.testing.enabled {
        email.recipient.insert(config.testing.email.clone(), None);
    } else {
        email.recipient = data.recipient;
        email.cc = data.cc;
        email.bcc = data.bcc;
    }
    email.reply_to = data.reply_to;

    email.from = data.from.or_else(|| config.from.clone());
    if email.from.is_none() {
        return Err(ValidationError::MissingSender.into());
    }

    email.subject = data.subject.unwrap_or_default();
    email.view = data.view;
    email.variables = match data.variables {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    // The body is materialized once, here, and persisted; delivery
    // replays the stored content instead of re-rendering.
    email.body = match (data.body, &email.view) {
        (Some(body), _) => body,
        (None, Some(view)) => renderer.render(view, &email.variables)?,
        (None, None) => String::new(),
    };

    email.attachments = data.attachments;

    email.scheduled_at = match data.scheduled {
        Some(Schedule::At(at)) => Some(at),
        Some(Schedule::Raw(raw)) => Some(parse_schedule(&raw)?),
        None => None,
    };

    if data.queued.is_some() {
        email.queued_at = Some(Utc::now());
    }

    Ok(email)
}
