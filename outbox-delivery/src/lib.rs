//! Delivery side of the queue: the send/retry state machine and the cycle
//! runner.
//!
//! This crate provides functionality to:
//! - Build transport-level envelopes from stored records
//! - Drive one send attempt through its atomic state transitions
//! - Resolve attachment references lazily at send time
//! - Run one bounded processing cycle and report a summary
//! - Hand records off to an asynchronous dispatcher

pub mod attachments;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod runner;
pub mod sender;
pub mod transport;

pub use attachments::{AttachmentSource, FsAttachmentSource, ResolutionError};
pub use dispatch::{DispatchOptions, Dispatcher, SendJob, TokioDispatcher};
pub use envelope::{Envelope, ResolvedAttachment};
pub use error::DeliveryError;
pub use runner::{CycleEntry, CycleSummary, RecordOutcome, Runner};
pub use sender::{SendOutcome, Sender};
pub use transport::{MockTransport, SmtpConfig, SmtpTransport, TlsMode, Transport, TransportError};
