//! The delivery transport abstraction and its SMTP implementation.
//!
//! The engine treats delivery as an opaque `deliver(envelope)` call: it
//! either returns or it fails, and the state machine only cares which. The
//! SMTP implementation rides on `lettre`; timeouts are bounded here so a
//! stuck delivery cannot stall a whole cycle.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use serde::Deserialize;
use thiserror::Error;

use crate::envelope::Envelope;

/// Errors produced by a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// An address on the envelope could not be used.
    #[error("invalid address: {0}")]
    Address(String),

    /// The wire message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),

    /// The provider refused or delivery failed.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivers one envelope. Either it completes or it raises; the sender
/// treats the call as atomic.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Deliver the envelope.
    ///
    /// # Errors
    /// Returns [`TransportError`] when delivery fails for any reason.
    async fn deliver(&self, envelope: &Envelope) -> Result<(), TransportError>;
}

/// How the SMTP connection negotiates TLS.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// No TLS. Local relays and tests only.
    None,
    /// STARTTLS upgrade on a plaintext connection (port 587).
    #[default]
    Starttls,
    /// TLS from the first byte (port 465).
    Implicit,
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname.
    pub host: String,

    /// Relay port.
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Username for authentication, if the relay requires it.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// TLS negotiation mode.
    #[serde(default)]
    pub tls: TlsMode,

    /// Timeout for one delivery, in seconds.
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,
}

mod defaults {
    pub const fn port() -> u16 {
        587
    }

    pub const fn timeout_secs() -> u64 {
        60
    }
}

/// SMTP transport over `lettre`.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    /// Returns [`TransportError::Build`] when the relay or TLS parameters
    /// are unusable.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let tls = match config.tls {
            TlsMode::None => Tls::None,
            TlsMode::Starttls => Tls::Required(tls_parameters(&config.host)?),
            TlsMode::Implicit => Tls::Wrapper(tls_parameters(&config.host)?),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| TransportError::Build(e.to_string()))?
            .port(config.port)
            .tls(tls)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
        })
    }
}

fn tls_parameters(host: &str) -> Result<TlsParameters, TransportError> {
    TlsParameters::new(host.to_string()).map_err(|e| TransportError::Build(e.to_string()))
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let message = build_message(envelope)?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| TransportError::Delivery(e.to_string()))?;

        Ok(())
    }
}

/// Assemble the wire message: headers, HTML body, attachments.
fn build_message(envelope: &Envelope) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&envelope.from.address, envelope.from.name.as_deref())?)
        .subject(envelope.subject.clone());

    for (address, name) in &envelope.to {
        builder = builder.to(parse_mailbox(address, name.as_deref())?);
    }
    for (address, name) in &envelope.cc {
        builder = builder.cc(parse_mailbox(address, name.as_deref())?);
    }
    for (address, name) in &envelope.bcc {
        builder = builder.bcc(parse_mailbox(address, name.as_deref())?);
    }
    for (address, name) in &envelope.reply_to {
        builder = builder.reply_to(parse_mailbox(address, name.as_deref())?);
    }

    let body = SinglePart::html(envelope.html_body.clone());

    let message = if envelope.attachments.is_empty() {
        builder.singlepart(body)
    } else {
        let mut multipart = MultiPart::mixed().singlepart(body);
        for attachment in &envelope.attachments {
            multipart = multipart.singlepart(
                lettre::message::Attachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type(attachment.mime.as_deref())?),
            );
        }
        builder.multipart(multipart)
    };

    message.map_err(|e| TransportError::Build(e.to_string()))
}

fn parse_mailbox(address: &str, name: Option<&str>) -> Result<Mailbox, TransportError> {
    let formatted = name.map_or_else(
        || address.to_string(),
        |name| format!("{name} <{address}>"),
    );

    formatted
        .parse()
        .map_err(|e| TransportError::Address(format!("{address}: {e}")))
}

fn content_type(mime: Option<&str>) -> Result<ContentType, TransportError> {
    ContentType::parse(mime.unwrap_or("application/octet-stream"))
        .map_err(|e| TransportError::Build(e.to_string()))
}

/// Test transport: records delivered envelopes and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    deliveries: Arc<Mutex<Vec<Envelope>>>,
    failures_remaining: Arc<AtomicUsize>,
}

impl MockTransport {
    /// A transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that fails every delivery.
    #[must_use]
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.failures_remaining.store(usize::MAX, Ordering::SeqCst);
        transport
    }

    /// Fail the next `n` deliveries, then accept again.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Envelopes delivered so far.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Envelope> {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of envelopes delivered so far.
    #[must_use]
    pub fn delivery_count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn deliver(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(TransportError::Delivery(
                "simulated transport failure".into(),
            ));
        }

        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(envelope.clone());

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use outbox_common::address::NamedAddress;

    use super::*;

    fn envelope() -> Envelope {
        let mut to = outbox_common::address::AddressMap::new();
        to.insert("john@doe.com".into(), Some("John".into()));

        Envelope {
            to,
            cc: outbox_common::address::AddressMap::new(),
            bcc: outbox_common::address::AddressMap::new(),
            reply_to: outbox_common::address::AddressMap::new(),
            from: NamedAddress::with_name("noreply@example.com", "Example"),
            subject: "Hello".into(),
            html_body: "<p>Hi</p>".into(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn builds_wire_messages() {
        let message = build_message(&envelope()).expect("buildable");
        let bytes = message.formatted();
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.contains("To: \"John\" <john@doe.com>") || text.contains("To: John <john@doe.com>"));
        assert!(text.contains("Subject: Hello"));
    }

    #[test]
    fn rejects_unparseable_addresses() {
        let mut bad = envelope();
        bad.to.insert("not an address".into(), None);

        assert!(matches!(
            build_message(&bad),
            Err(TransportError::Address(_))
        ));
    }

    #[tokio::test]
    async fn mock_transport_scripts_failures() {
        let transport = MockTransport::new();
        transport.fail_next(2);

        assert!(transport.deliver(&envelope()).await.is_err());
        assert!(transport.deliver(&envelope()).await.is_err());
        assert!(transport.deliver(&envelope()).await.is_ok());
        assert_eq!(transport.delivery_count(), 1);
    }

    #[test]
    fn smtp_config_defaults() {
        let config: SmtpConfig = toml::from_str(
            r#"
            host = "smtp.example.com"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.port, 587);
        assert_eq!(config.tls, TlsMode::Starttls);
        assert_eq!(config.timeout_secs, 60);
    }
}
