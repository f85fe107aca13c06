//! Structured message descriptions.
//!
//! A [`Mailable`] is a pre-built description of envelope plus content,
//! the alternative to setting composer fields one by one. Application code
//! builds one per message kind and hands it to
//! [`EmailComposer::mailable`](crate::EmailComposer::mailable); it goes
//! through the same validation and preparation as manual composition.

use serde_json::{Map, Value};

use outbox_common::address::{AddressMap, NamedAddress};
use outbox_store::Attachment;

/// A pre-built envelope + content description.
#[derive(Debug, Clone, Default)]
pub struct Mailable {
    pub to: AddressMap,
    pub cc: AddressMap,
    pub bcc: AddressMap,
    pub reply_to: AddressMap,
    pub from: Option<NamedAddress>,
    pub subject: Option<String>,
    pub view: Option<String>,
    pub variables: Map<String, Value>,
    /// Pre-rendered content, used instead of `view`.
    pub body: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl Mailable {
    /// An empty description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primary recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.insert(address.into(), None);
        self
    }

    /// Add a primary recipient with a display name.
    #[must_use]
    pub fn to_named(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.to.insert(address.into(), Some(name.into()));
        self
    }

    /// Add a carbon-copy recipient.
    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.insert(address.into(), None);
        self
    }

    /// Add a blind-carbon-copy recipient.
    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.insert(address.into(), None);
        self
    }

    /// Add a reply-to address.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to.insert(address.into(), None);
        self
    }

    /// Set the sender.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(NamedAddress::new(address));
        self
    }

    /// Set the sender with a display name.
    #[must_use]
    pub fn from_named(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.from = Some(NamedAddress::with_name(address, name));
        self
    }

    /// Set the subject line.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the view the body is rendered from.
    #[must_use]
    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Set one template variable.
    #[must_use]
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Supply pre-rendered HTML content instead of a view.
    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add an attachment reference.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
