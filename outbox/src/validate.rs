//! Compose-time validation.
//!
//! Validation runs as the first stage of `send()`, before anything is
//! persisted. A failure aborts composition synchronously; no partial
//! record is ever created.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use outbox_common::{address, address::AddressError, render::Renderer};

use crate::compose::{ComposeData, Schedule};

/// Why a composition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The label exceeds 255 characters.
    #[error("the given label [{0}] is too large for storage")]
    LabelTooLong(String),

    /// No recipient was supplied.
    #[error("no recipient specified")]
    NoRecipient,

    /// An address failed the syntax check.
    #[error("e-mail address [{0}] is invalid: {1}")]
    InvalidAddress(String, AddressError),

    /// No subject was supplied.
    #[error("no subject specified")]
    NoSubject,

    /// Neither a view nor pre-rendered content was supplied.
    #[error("no view specified")]
    NoView,

    /// The referenced view is not known to the renderer.
    #[error("view [{0}] does not exist")]
    UnknownView(String),

    /// Variables were supplied but are not a mapping.
    #[error("variables must be a map of values")]
    InvalidVariables,

    /// The scheduled date string is not an absolute timestamp.
    #[error("scheduled date [{0}] could not be parsed")]
    InvalidScheduled(String),

    /// No sender was supplied and no system-wide sender is configured.
    #[error("no sender specified and no system-wide sender configured")]
    MissingSender,
}

/// Validate accumulated compose data against the rules in one pass.
///
/// # Errors
/// Returns the first [`ValidationError`] found.
pub fn validate(data: &ComposeData, renderer: &dyn Renderer) -> Result<(), ValidationError> {
    if let Some(label) = &data.label
        && label.len() > 255
    {
        return Err(ValidationError::LabelTooLong(label.clone()));
    }

    if data.recipient.is_empty() {
        return Err(ValidationError::NoRecipient);
    }
    for address in data
        .recipient
        .keys()
        .chain(data.cc.keys())
        .chain(data.bcc.keys())
        .chain(data.reply_to.keys())
    {
        address::validate(address)
            .map_err(|e| ValidationError::InvalidAddress(address.clone(), e))?;
    }

    if data.subject.as_deref().is_none_or(str::is_empty) {
        return Err(ValidationError::NoSubject);
    }

    match (&data.view, &data.body) {
        // Pre-rendered content needs no view.
        (None, Some(_)) => {}
        (None, None) => return Err(ValidationError::NoView),
        (Some(view), _) => {
            if !renderer.exists(view) {
                return Err(ValidationError::UnknownView(view.clone()));
            }
        }
    }

    if let Some(variables) = &data.variables
        && !matches!(variables, Value::Object(_))
    {
        return Err(ValidationError::InvalidVariables);
    }

    if let Some(Schedule::Raw(raw)) = &data.scheduled {
        parse_schedule(raw)?;
    }

    Ok(())
}

/// Parse a scheduled-date string as an absolute timestamp.
///
/// Accepts RFC 3339 (`2026-08-07T09:00:00Z`) or a bare
/// `YYYY-MM-DD HH:MM:SS` interpreted as UTC.
///
/// # Errors
/// Returns [`ValidationError::InvalidScheduled`] when neither form parses.
pub fn parse_schedule(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidScheduled(raw.to_string()))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_timestamps() {
        let rfc3339 = parse_schedule("2026-08-07T09:00:00Z").expect("rfc 3339");
        assert_eq!(rfc3339.to_rfc3339(), "2026-08-07T09:00:00+00:00");

        let bare = parse_schedule("2026-08-07 09:00:00").expect("bare form");
        assert_eq!(bare, rfc3339);
    }

    #[test]
    fn rejects_relative_or_garbage_dates() {
        for raw in ["tomorrow", "+2 weeks", "2026-13-40 99:00:00", ""] {
            assert!(
                matches!(
                    parse_schedule(raw),
                    Err(ValidationError::InvalidScheduled(_))
                ),
                "{raw} should be rejected"
            );
        }
    }
}
