//! Assembly of the engine: configuration file shape, collaborator wiring,
//! and the [`Outbox`] facade everything hangs off.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use outbox_common::{
    config::Config,
    render::{Renderer, StaticRenderer},
};
use outbox_delivery::{
    AttachmentSource, FsAttachmentSource, Runner, Sender, SmtpConfig, SmtpTransport,
    TokioDispatcher, Transport, TransportError,
};
use outbox_store::{CryptoError, Cryptor, Store, StoreConfig, StoreError};

use crate::compose::EmailComposer;

/// Errors assembling an [`Outbox`].
#[derive(Debug, Error)]
pub enum SetupError {
    /// No store was supplied.
    #[error("no store configured")]
    MissingStore,

    /// No transport was supplied.
    #[error("no transport configured")]
    MissingTransport,

    /// Encryption is enabled but no key was configured.
    #[error("encryption enabled but no encryption_key configured")]
    MissingEncryptionKey,

    /// No `[smtp]` section in the configuration file.
    #[error("no [smtp] section configured")]
    MissingSmtpConfig,

    /// The encryption key is unusable.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The store could not be initialised.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transport could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Shape of the TOML configuration file.
///
/// ```toml
/// [queue]
/// attempts = 3
/// limit = 20
///
/// [store]
/// type = "File"
/// path = "/var/spool/outbox"
///
/// [smtp]
/// host = "smtp.example.com"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Queue engine options.
    #[serde(default)]
    pub queue: Config,

    /// Record storage backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// SMTP relay. Required to actually send.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

impl OutboxConfig {
    /// Wire the configured collaborators into a ready [`Outbox`].
    ///
    /// # Errors
    /// Returns [`SetupError`] when the encryption key, store, or transport
    /// cannot be built.
    pub fn build(self) -> Result<Outbox, SetupError> {
        let cryptor = if self.queue.encrypt {
            let key = self
                .queue
                .encryption_key
                .as_deref()
                .ok_or(SetupError::MissingEncryptionKey)?;
            Some(Cryptor::from_base64_key(key)?)
        } else {
            None
        };

        let store = self.store.into_store(cryptor)?;

        let smtp = self.smtp.ok_or(SetupError::MissingSmtpConfig)?;
        let transport: Arc<dyn Transport> = Arc::new(SmtpTransport::new(&smtp)?);

        Outbox::builder()
            .config(self.queue)
            .store(store)
            .transport(transport)
            .build()
    }
}

/// The assembled engine: configuration plus collaborators.
///
/// Everything is explicit: the composer, store, sender, and runner all
/// receive their configuration and collaborators from here; nothing reads
/// global state.
#[derive(Debug, Clone)]
pub struct Outbox {
    config: Config,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    attachments: Arc<dyn AttachmentSource>,
    renderer: Arc<dyn Renderer>,
}

impl Outbox {
    /// Start assembling an engine.
    #[must_use]
    pub fn builder() -> OutboxBuilder {
        OutboxBuilder::default()
    }

    /// Compose a new e-mail.
    #[must_use]
    pub fn compose(&self) -> EmailComposer<'_> {
        EmailComposer::new(self)
    }

    /// A sender over this engine's collaborators.
    #[must_use]
    pub fn sender(&self) -> Sender {
        Sender::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.attachments),
            Arc::clone(&self.renderer),
            self.config.max_attempts(),
        )
    }

    /// A queue runner over this engine's collaborators.
    #[must_use]
    pub fn runner(&self) -> Runner {
        Runner::new(Arc::clone(&self.store), self.sender(), self.config.clone())
    }

    /// The in-process asynchronous dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> TokioDispatcher {
        TokioDispatcher::new(Arc::clone(&self.store), self.sender())
    }

    /// The record store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }
}

/// Builder for [`Outbox`].
#[derive(Debug, Default)]
pub struct OutboxBuilder {
    config: Config,
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn Transport>>,
    attachments: Option<Arc<dyn AttachmentSource>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl OutboxBuilder {
    /// Set the engine configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the record store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the delivery transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the attachment source. Defaults to the filesystem source with
    /// no named disks.
    #[must_use]
    pub fn attachments(mut self, attachments: Arc<dyn AttachmentSource>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Set the template renderer. Defaults to an empty [`StaticRenderer`],
    /// which only accepts pre-rendered bodies.
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Finish assembly.
    ///
    /// # Errors
    /// Returns [`SetupError`] when the store or transport is missing.
    pub fn build(self) -> Result<Outbox, SetupError> {
        Ok(Outbox {
            config: self.config,
            store: self.store.ok_or(SetupError::MissingStore)?,
            transport: self.transport.ok_or(SetupError::MissingTransport)?,
            attachments: self
                .attachments
                .unwrap_or_else(|| Arc::new(FsAttachmentSource::new())),
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(StaticRenderer::new())),
        })
    }
}
