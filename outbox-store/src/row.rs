//! The stored representation of a record, and the codec between it and
//! [`Email`].
//!
//! A row holds sensitive fields as strings: JSON-encoded plaintext, or
//! ciphertext when the store was built with a [`Cryptor`]. Lifecycle
//! columns (`attempts`, `sending`, `failed`, the timestamps) always stay
//! plain so selection predicates never have to touch ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{crypto::Cryptor, error::Result, record::Email, types::EmailId};

/// One persisted row. What the backends actually write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRow {
    pub id: EmailId,
    pub label: Option<String>,
    pub recipient: String,
    pub cc: String,
    pub bcc: String,
    pub reply_to: String,
    pub from: String,
    pub subject: String,
    pub view: Option<String>,
    pub variables: String,
    pub body: String,
    pub attachments: String,
    pub attempts: u32,
    pub sending: bool,
    pub failed: bool,
    pub error: Option<String>,
    pub encrypted: bool,
    pub queued_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EmailRow {
    /// Encode a record for storage.
    ///
    /// Structured fields are JSON-encoded; when a cryptor is supplied the
    /// sensitive fields are sealed afterwards and the row is flagged
    /// `encrypted`. Attachment references are never sealed: they point at
    /// external storage, not inline content.
    ///
    /// # Errors
    /// Returns an error if field encoding or sealing fails.
    pub fn encode(email: &Email, cryptor: Option<&Cryptor>) -> Result<Self> {
        let seal = |value: String| -> Result<String> {
            match cryptor {
                Some(cryptor) => Ok(cryptor.seal(&value)?),
                None => Ok(value),
            }
        };

        Ok(Self {
            id: email.id,
            label: email.label.clone(),
            recipient: seal(serde_json::to_string(&email.recipient)?)?,
            cc: seal(serde_json::to_string(&email.cc)?)?,
            bcc: seal(serde_json::to_string(&email.bcc)?)?,
            reply_to: seal(serde_json::to_string(&email.reply_to)?)?,
            from: seal(serde_json::to_string(&email.from)?)?,
            subject: seal(email.subject.clone())?,
            view: email.view.clone(),
            variables: seal(serde_json::to_string(&email.variables)?)?,
            body: seal(email.body.clone())?,
            attachments: serde_json::to_string(&email.attachments)?,
            attempts: email.attempts,
            sending: email.sending,
            failed: email.failed,
            error: email.error.clone(),
            encrypted: cryptor.is_some(),
            queued_at: email.queued_at,
            scheduled_at: email.scheduled_at,
            sent_at: email.sent_at,
            delivered_at: email.delivered_at,
            created_at: email.created_at,
            updated_at: email.updated_at,
            deleted_at: email.deleted_at,
        })
    }

    /// Decode a row back into a record.
    ///
    /// Decryption is transparent: accessing a decoded record always yields
    /// plaintext. A field sealed under a rotated or missing key degrades to
    /// its empty value instead of failing, so one stale row cannot abort a
    /// bulk read.
    #[must_use]
    pub fn decode(&self, cryptor: Option<&Cryptor>) -> Email {
        let open = |value: &str| -> Option<String> {
            if self.encrypted {
                cryptor.and_then(|cryptor| cryptor.open(value))
            } else {
                Some(value.to_string())
            }
        };

        Email {
            id: self.id,
            label: self.label.clone(),
            recipient: decode_json(open(&self.recipient)),
            cc: decode_json(open(&self.cc)),
            bcc: decode_json(open(&self.bcc)),
            reply_to: decode_json(open(&self.reply_to)),
            from: decode_json(open(&self.from)),
            subject: open(&self.subject).unwrap_or_default(),
            view: self.view.clone(),
            variables: decode_json(open(&self.variables)),
            body: open(&self.body).unwrap_or_default(),
            attachments: decode_json(Some(self.attachments.clone())),
            attempts: self.attempts,
            sending: self.sending,
            failed: self.failed,
            error: self.error.clone(),
            encrypted: self.encrypted,
            queued_at: self.queued_at,
            scheduled_at: self.scheduled_at,
            sent_at: self.sent_at,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    /// Whether this row satisfies the selector's eligibility predicate.
    #[must_use]
    pub fn is_eligible(&self, max_attempts: u32, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none()
            && self.sent_at.is_none()
            && self.scheduled_at.is_none_or(|at| at <= now)
            && !self.failed
            && !self.sending
            && self.attempts < max_attempts
    }
}

fn decode_json<T: DeserializeOwned + Default>(value: Option<String>) -> T {
    value
        .and_then(|value| serde_json::from_str(&value).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{crypto::Cryptor, record::Attachment};

    fn sample_email() -> Email {
        let mut email = Email::new();
        email.recipient.insert("john@doe.com".into(), None);
        email.cc.insert("jane@doe.com".into(), Some("Jane".into()));
        email.from = Some(outbox_common::address::NamedAddress::with_name(
            "noreply@example.com",
            "Example",
        ));
        email.subject = "Hello".into();
        email.view = Some("welcome".into());
        email
            .variables
            .insert("name".into(), serde_json::Value::String("Jane".into()));
        email.body = "<p>Welcome, Jane</p>".into();
        email
            .attachments
            .push(Attachment::from_path("/srv/files/invoice.pdf").with_mime("application/pdf"));
        email
    }

    #[test]
    fn plaintext_round_trip_preserves_all_fields() {
        let email = sample_email();
        let row = EmailRow::encode(&email, None).unwrap();

        assert!(!row.encrypted);
        assert!(row.recipient.contains("john@doe.com"));

        assert_eq!(row.decode(None), email);
    }

    #[test]
    fn encrypted_round_trip_hides_and_restores_fields() {
        let cryptor = Cryptor::new(&[3u8; 32]);
        let email = sample_email();
        let row = EmailRow::encode(&email, Some(&cryptor)).unwrap();

        assert!(row.encrypted);
        for (field, plain) in [
            (&row.recipient, "john@doe.com"),
            (&row.subject, "Hello"),
            (&row.body, "Welcome"),
            (&row.variables, "Jane"),
        ] {
            assert!(!field.contains(plain), "{plain} leaked into storage");
        }
        // Attachment references stay readable.
        assert!(row.attachments.contains("invoice.pdf"));

        let decoded = row.decode(Some(&cryptor));
        assert_eq!(decoded.recipient, email.recipient);
        assert_eq!(decoded.subject, email.subject);
        assert_eq!(decoded.body, email.body);
        assert_eq!(decoded.variables, email.variables);
        assert!(decoded.encrypted);
    }

    #[test]
    fn wrong_key_degrades_to_empty_values() {
        let cryptor = Cryptor::new(&[3u8; 32]);
        let email = sample_email();
        let row = EmailRow::encode(&email, Some(&cryptor)).unwrap();

        let decoded = row.decode(Some(&Cryptor::new(&[4u8; 32])));
        assert!(decoded.recipient.is_empty());
        assert!(decoded.subject.is_empty());
        assert!(decoded.body.is_empty());
        // Lifecycle columns are unaffected.
        assert_eq!(decoded.id, email.id);
        assert_eq!(decoded.attempts, email.attempts);
    }

    #[test]
    fn eligibility_predicate_matches_the_selector_rules() {
        let now = Utc::now();
        let email = sample_email();
        let row = EmailRow::encode(&email, None).unwrap();
        assert!(row.is_eligible(3, now));

        let mut sent = row.clone();
        sent.sent_at = Some(now);
        assert!(!sent.is_eligible(3, now));

        let mut sending = row.clone();
        sending.sending = true;
        assert!(!sending.is_eligible(3, now));

        let mut failed = row.clone();
        failed.failed = true;
        assert!(!failed.is_eligible(3, now));

        let mut exhausted = row.clone();
        exhausted.attempts = 3;
        assert!(!exhausted.is_eligible(3, now));

        let mut deferred = row.clone();
        deferred.scheduled_at = Some(now + chrono::Duration::hours(1));
        assert!(!deferred.is_eligible(3, now));
        deferred.scheduled_at = Some(now - chrono::Duration::hours(1));
        assert!(deferred.is_eligible(3, now));

        let mut deleted = row;
        deleted.deleted_at = Some(now);
        assert!(!deleted.is_eligible(3, now));
    }
}
