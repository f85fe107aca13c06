//! The transport-level message envelope.

use outbox_common::address::{AddressMap, NamedAddress};
use outbox_store::Email;

use crate::transport::TransportError;

/// An attachment with its content loaded, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Filename presented to the recipient.
    pub filename: String,
    /// MIME type, when known.
    pub mime: Option<String>,
    /// The attachment bytes.
    pub content: Vec<u8>,
}

/// Everything the transport needs to deliver one message.
///
/// Built fresh for every attempt from the stored record; attachment content
/// is resolved at send time, not at compose time, so disk content can be
/// rotated or garbage-collected independently of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: AddressMap,
    pub cc: AddressMap,
    pub bcc: AddressMap,
    pub reply_to: AddressMap,
    pub from: NamedAddress,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<ResolvedAttachment>,
}

impl Envelope {
    /// Build an envelope from a record and its resolved attachments.
    ///
    /// # Errors
    /// Returns a build error when the record carries no sender, which can
    /// only happen when decryption degraded the field; composition always
    /// fills it.
    pub fn build(
        email: &Email,
        attachments: Vec<ResolvedAttachment>,
    ) -> Result<Self, TransportError> {
        let from = email
            .from
            .clone()
            .ok_or_else(|| TransportError::Build("record has no sender".into()))?;

        Ok(Self {
            to: email.recipient.clone(),
            cc: email.cc.clone(),
            bcc: email.bcc.clone(),
            reply_to: email.reply_to.clone(),
            from,
            subject: email.subject.clone(),
            html_body: email.body.clone(),
            attachments,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use outbox_common::address::NamedAddress;

    use super::*;

    #[test]
    fn build_copies_record_fields() {
        let mut email = Email::new();
        email.recipient.insert("john@doe.com".into(), None);
        email.from = Some(NamedAddress::new("noreply@example.com"));
        email.subject = "Hello".into();
        email.body = "<p>Hi</p>".into();

        let envelope = Envelope::build(&email, Vec::new()).expect("buildable");
        assert_eq!(envelope.subject, "Hello");
        assert_eq!(envelope.html_body, "<p>Hi</p>");
        assert!(envelope.to.contains_key("john@doe.com"));
        assert_eq!(envelope.from.address, "noreply@example.com");
    }

    #[test]
    fn build_requires_a_sender() {
        let mut email = Email::new();
        email.recipient.insert("john@doe.com".into(), None);

        assert!(matches!(
            Envelope::build(&email, Vec::new()),
            Err(TransportError::Build(_))
        ));
    }
}
