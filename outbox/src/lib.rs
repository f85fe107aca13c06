//! A database-backed e-mail dispatch queue.
//!
//! Outgoing e-mail is written as a durable record before anything touches
//! the network, which buys deferred, scheduled, retried, and audited
//! delivery instead of fire-and-forget transmission.
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use outbox::Outbox;
//!
//! let outbox: Outbox = toml::from_str::<outbox::OutboxConfig>(
//!     &std::fs::read_to_string("outbox.toml")?,
//! )?
//! .build()?;
//!
//! outbox
//!     .compose()
//!     .recipient("john@doe.com")
//!     .subject("Hello")
//!     .view("welcome")
//!     .variables(serde_json::json!({ "name": "Jane" }))
//!     .send()
//!     .await?;
//!
//! // Later, driven by a scheduler:
//! let summary = outbox.runner().run_cycle().await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod compose;
pub mod controller;
pub mod mailable;
pub mod validate;

pub use compose::{ComposeError, EmailComposer, Schedule};
pub use controller::{Outbox, OutboxBuilder, OutboxConfig, SetupError};
pub use mailable::Mailable;
pub use outbox_common::{Config, address, config, logging, render};
pub use outbox_delivery::{CycleSummary, DispatchOptions, Runner, Sender};
pub use outbox_store::{Attachment, Email, EmailId, Store, StoreConfig};
pub use validate::ValidationError;
