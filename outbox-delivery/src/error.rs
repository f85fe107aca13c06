//! Typed error handling for delivery operations.
//!
//! The distinction that matters here is *who sees what*: transport,
//! resolution, and render failures are consumed by the sender and recorded
//! into the failing record, while store failures propagate to the runner
//! because without the store nothing can be recorded at all.

use thiserror::Error;

use outbox_common::render::RenderError;
use outbox_store::StoreError;

use crate::{attachments::ResolutionError, transport::TransportError};

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport rejected or could not deliver the envelope.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// An attachment could not be resolved at send time.
    #[error("attachment resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// The body fallback render failed.
    #[error("render failure: {0}")]
    Render(#[from] RenderError),

    /// The store failed; record state could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_preserve_the_message() {
        let err: DeliveryError = TransportError::Delivery("connection refused".into()).into();
        assert_eq!(
            err.to_string(),
            "transport failure: delivery failed: connection refused"
        );

        let err: DeliveryError = ResolutionError::NotFound("/srv/missing.pdf".into()).into();
        assert_eq!(
            err.to_string(),
            "attachment resolution failed: attachment not found: /srv/missing.pdf"
        );
    }
}
