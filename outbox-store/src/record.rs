//! The Message Record: one durable row per outgoing e-mail.

use chrono::{DateTime, Utc};
use outbox_common::address::{AddressMap, NamedAddress};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::EmailId;

/// An attachment reference stored with a record.
///
/// Attachments always point at a retrievable location (a plain path or a
/// named disk plus path) and are resolved lazily at send time. Raw
/// in-memory byte attachments are not representable: content has to survive
/// process restarts and cross-process delivery, so there is deliberately no
/// constructor for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Path to the content, absolute or relative to the disk root.
    pub path: String,

    /// Named disk the path is relative to, if any.
    #[serde(default)]
    pub disk: Option<String>,

    /// Filename presented to the recipient. Defaults to the path's
    /// final component.
    #[serde(default)]
    pub display_name: Option<String>,

    /// MIME type override.
    #[serde(default)]
    pub mime: Option<String>,
}

impl Attachment {
    /// Reference a file by plain path.
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            disk: None,
            display_name: None,
            mime: None,
        }
    }

    /// Reference a file on a named disk.
    #[must_use]
    pub fn from_disk(disk: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            disk: Some(disk.into()),
            display_name: None,
            mime: None,
        }
    }

    /// Set the filename presented to the recipient.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the MIME type.
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// One queued e-mail: the unit of durability and the unit of retry.
///
/// All fields hold plaintext; encryption at rest happens below this type,
/// at the row codec. Components other than the store never see ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    /// Unique, creation-ordered identifier.
    pub id: EmailId,
    /// Free-form classification tag (at most 255 characters).
    pub label: Option<String>,
    /// Primary recipients: address mapped to optional display name.
    pub recipient: AddressMap,
    /// Carbon-copy recipients.
    pub cc: AddressMap,
    /// Blind-carbon-copy recipients.
    pub bcc: AddressMap,
    /// Reply-to addresses.
    pub reply_to: AddressMap,
    /// Sender identity. `None` falls back to the system-wide sender.
    pub from: Option<NamedAddress>,
    /// Subject line.
    pub subject: String,
    /// Template identifier the body was rendered from, if any.
    pub view: Option<String>,
    /// Variables the body was rendered with.
    pub variables: Map<String, Value>,
    /// Final rendered content. Persisted so delivery never re-renders.
    pub body: String,
    /// Attachment references, in presentation order.
    pub attachments: Vec<Attachment>,
    /// Number of send attempts made. Only ever increases.
    pub attempts: u32,
    /// True while a send is in flight; acts as the record's lock.
    pub sending: bool,
    /// True once attempts are exhausted.
    pub failed: bool,
    /// Description of the most recent failure.
    pub error: Option<String>,
    /// Whether the stored representation of this record is ciphertext.
    pub encrypted: bool,
    /// When the record was handed to the async dispatcher.
    pub queued_at: Option<DateTime<Utc>>,
    /// Do not send before this instant. `None` means "as soon as eligible".
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When delivery succeeded. Presence is the terminal "done" signal.
    pub sent_at: Option<DateTime<Utc>>,
    /// Transport-level delivery confirmation, when available.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Creation timestamp; selection orders on this, oldest first.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Email {
    /// A blank pending record with a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();

        Self {
            id: EmailId::generate(),
            label: None,
            recipient: AddressMap::new(),
            cc: AddressMap::new(),
            bcc: AddressMap::new(),
            reply_to: AddressMap::new(),
            from: None,
            subject: String::new(),
            view: None,
            variables: Map::new(),
            body: String::new(),
            attachments: Vec::new(),
            attempts: 0,
            sending: false,
            failed: false,
            error: None,
            encrypted: false,
            queued_at: None,
            scheduled_at: None,
            sent_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether delivery has succeeded.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }

    /// Whether the record reached the terminal failed state.
    #[must_use]
    pub const fn has_failed(&self) -> bool {
        self.failed
    }

    /// Whether the record is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Build a fresh record for retrying this one.
    ///
    /// User-supplied fields are copied; lifecycle fields are reset to their
    /// initial values. The source record is left untouched so every attempt
    /// generation stays in the audit trail.
    #[must_use]
    pub fn retry_copy(&self) -> Self {
        let now = Utc::now();

        Self {
            id: EmailId::generate(),
            label: self.label.clone(),
            recipient: self.recipient.clone(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
            reply_to: self.reply_to.clone(),
            from: self.from.clone(),
            subject: self.subject.clone(),
            view: self.view.clone(),
            variables: self.variables.clone(),
            body: self.body.clone(),
            attachments: self.attachments.clone(),
            attempts: 0,
            sending: false,
            failed: false,
            error: None,
            encrypted: false,
            queued_at: self.queued_at,
            scheduled_at: self.scheduled_at,
            sent_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Default for Email {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_records_start_pending() {
        let email = Email::new();

        assert_eq!(email.attempts, 0);
        assert!(!email.sending);
        assert!(!email.failed);
        assert!(email.sent_at.is_none());
        assert!(!email.is_sent());
        assert!(!email.is_deleted());
    }

    #[test]
    fn retry_copy_resets_lifecycle_and_keeps_content() {
        let mut original = Email::new();
        original.label = Some("invoices".into());
        original.recipient.insert("john@doe.com".into(), None);
        original.subject = "Hello".into();
        original.body = "<p>Hi</p>".into();
        original
            .attachments
            .push(Attachment::from_path("/srv/files/invoice.pdf"));
        original.attempts = 3;
        original.failed = true;
        original.error = Some("connection refused".into());
        original.sent_at = None;

        let copy = original.retry_copy();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.label, original.label);
        assert_eq!(copy.recipient, original.recipient);
        assert_eq!(copy.subject, original.subject);
        assert_eq!(copy.body, original.body);
        assert_eq!(copy.attachments, original.attachments);
        assert_eq!(copy.attempts, 0);
        assert!(!copy.sending);
        assert!(!copy.failed);
        assert!(copy.error.is_none());
        assert!(copy.sent_at.is_none());
        assert!(copy.delivered_at.is_none());

        // The source record is untouched.
        assert_eq!(original.attempts, 3);
        assert!(original.failed);
    }
}
