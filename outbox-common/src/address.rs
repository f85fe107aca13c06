//! RFC 5321 mailbox syntax validation.
//!
//! Every caller-supplied address is checked against the `Mailbox` grammar of
//! RFC 5321 section 4.1.2 (`local-part@domain`) before a record is persisted.
//! This is a syntax check only; whether the address is deliverable is the
//! transport's problem.
//!
//! Size constraints:
//! - local-part: at most 64 octets
//! - domain: at most 255 octets

use std::{collections::BTreeMap, fmt, net::Ipv4Addr, net::Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while validating a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Empty input.
    #[error("empty address")]
    Empty,

    /// Local-part exceeds 64 octets.
    #[error("local-part exceeds 64 octets")]
    LocalPartTooLong,

    /// Domain exceeds 255 octets.
    #[error("domain exceeds 255 octets")]
    DomainTooLong,

    /// Missing `@` separator.
    #[error("missing '@' separator in address")]
    MissingAtSign,

    /// Invalid character or structure in the local-part.
    #[error("invalid local-part: {0}")]
    InvalidLocalPart(String),

    /// Invalid character or structure in the domain.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// Quoted local-part without a closing quote.
    #[error("unclosed quoted string in local-part")]
    UnclosedQuotedString,
}

/// A validated mailbox, split into its local part and domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    /// The part before `@`.
    pub local_part: String,
    /// The domain or address literal after `@`.
    pub domain: String,
}

impl Mailbox {
    /// Parse and validate a bare `local-part@domain` address.
    ///
    /// # Errors
    /// Returns an [`AddressError`] describing the first violation found.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let at = find_unquoted_at(trimmed)?;
        let (local_part, domain) = (&trimmed[..at], &trimmed[at + 1..]);

        if local_part.len() > 64 {
            return Err(AddressError::LocalPartTooLong);
        }
        if domain.len() > 255 {
            return Err(AddressError::DomainTooLong);
        }

        validate_local_part(local_part)?;
        validate_domain(domain)?;

        Ok(Self {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Validate an address, discarding the parsed form.
///
/// # Errors
/// Returns an [`AddressError`] describing the first violation found.
pub fn validate(input: &str) -> Result<(), AddressError> {
    Mailbox::parse(input).map(|_| ())
}

/// An address paired with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAddress {
    /// The bare e-mail address.
    pub address: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl NamedAddress {
    /// Create a named address without a display name.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Create a named address with a display name.
    #[must_use]
    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for NamedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// A set of recipients: address mapped to an optional display name.
///
/// A `BTreeMap` keeps the persisted encoding deterministic.
pub type AddressMap = BTreeMap<String, Option<String>>;

/// Render an address map as a comma-separated list for operator output.
#[must_use]
pub fn format_address_map(addresses: &AddressMap) -> String {
    addresses
        .iter()
        .map(|(address, name)| {
            name.as_ref()
                .map_or_else(|| address.clone(), |name| format!("{name} <{address}>"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Find the position of `@` that is not inside a quoted string.
fn find_unquoted_at(input: &str) -> Result<usize, AddressError> {
    let mut in_quotes = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.chars().enumerate() {
        if ch == '"' && !prev_was_backslash {
            in_quotes = !in_quotes;
        } else if ch == '@' && !in_quotes {
            return Ok(i);
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    Err(AddressError::MissingAtSign)
}

/// Validate a local-part: Dot-string or Quoted-string.
fn validate_local_part(input: &str) -> Result<(), AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty local-part".into()));
    }

    if input.starts_with('"') {
        validate_quoted_string(input)
    } else {
        validate_dot_string(input)
    }
}

/// Validate a Dot-string: `Atom *("." Atom)`.
fn validate_dot_string(input: &str) -> Result<(), AddressError> {
    if input.starts_with('.') || input.ends_with('.') || input.contains("..") {
        return Err(AddressError::InvalidLocalPart(
            "misplaced '.' in dot-string".into(),
        ));
    }

    for ch in input.chars() {
        if ch != '.' && !is_atext(ch) {
            return Err(AddressError::InvalidLocalPart(format!(
                "invalid character '{ch}'"
            )));
        }
    }

    Ok(())
}

/// Validate a Quoted-string: `DQUOTE *QcontentSMTP DQUOTE`.
fn validate_quoted_string(input: &str) -> Result<(), AddressError> {
    if !input.ends_with('"') || input.len() < 2 {
        return Err(AddressError::UnclosedQuotedString);
    }

    let content = &input[1..input.len() - 1];
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                _ => {
                    return Err(AddressError::InvalidLocalPart(
                        "invalid quoted-pair".into(),
                    ));
                }
            }
        } else if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidLocalPart(format!(
                "invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(())
}

/// Validate a domain or bracketed address literal.
fn validate_domain(input: &str) -> Result<(), AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("empty domain".into()));
    }

    if input.starts_with('[') {
        return validate_address_literal(input);
    }

    if input.starts_with('.') || input.ends_with('.') || input.contains("..") {
        return Err(AddressError::InvalidDomain("misplaced '.' in domain".into()));
    }

    for label in input.split('.') {
        validate_label(label)?;
    }

    Ok(())
}

/// Validate a domain label: `Let-dig [Ldh-str]`.
fn validate_label(label: &str) -> Result<(), AddressError> {
    let first = label.chars().next();
    let last = label.chars().last();

    if first.is_none_or(|c| !c.is_ascii_alphanumeric())
        || last.is_none_or(|c| !c.is_ascii_alphanumeric())
    {
        return Err(AddressError::InvalidDomain(format!(
            "label '{label}' must start and end with a letter or digit"
        )));
    }

    for ch in label.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '-' {
            return Err(AddressError::InvalidDomain(format!(
                "invalid character '{ch}' in label"
            )));
        }
    }

    Ok(())
}

/// Validate `[IPv4]` or `[IPv6:...]` address literals.
fn validate_address_literal(input: &str) -> Result<(), AddressError> {
    if !input.ends_with(']') {
        return Err(AddressError::InvalidDomain(
            "address literal must be enclosed in brackets".into(),
        ));
    }

    let content = &input[1..input.len() - 1];

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:")
        && ipv6.parse::<Ipv6Addr>().is_ok()
    {
        return Ok(());
    }

    Err(AddressError::InvalidDomain(format!(
        "invalid address literal '{input}'"
    )))
}

/// atext per RFC 5321: ALPHA / DIGIT / printable specials.
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// qtextSMTP: %d32-33 / %d35-91 / %d93-126.
const fn is_qtext_smtp(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn accepts_common_addresses() {
        for address in [
            "john@doe.com",
            "john.doe@example.com",
            "user+tag@sub.example.org",
            "ops_team@mail-1.example.io",
            "\"quoted local\"@example.com",
            "user@[127.0.0.1]",
            "user@[IPv6:::1]",
        ] {
            assert!(validate(address).is_ok(), "{address} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for address in [
            "",
            "no-at-sign",
            "@example.com",
            "user@",
            ".leading@example.com",
            "trailing.@example.com",
            "double..dot@example.com",
            "user@-bad.com",
            "user@bad-.com",
            "user@double..dot.com",
            "user@[999.0.0.1]",
            "\"unclosed@example.com",
            "sp ace@example.com",
        ] {
            assert!(validate(address).is_err(), "{address} should be invalid");
        }
    }

    #[test]
    fn enforces_size_constraints() {
        let long_local = format!("{}@example.com", "a".repeat(65));
        assert_eq!(
            Mailbox::parse(&long_local),
            Err(AddressError::LocalPartTooLong)
        );

        let long_domain = format!("user@{}", "a".repeat(256));
        assert_eq!(
            Mailbox::parse(&long_domain),
            Err(AddressError::DomainTooLong)
        );
    }

    #[test]
    fn splits_local_part_and_domain() {
        let mailbox = Mailbox::parse("john@doe.com").expect("valid address");
        assert_eq!(mailbox.local_part, "john");
        assert_eq!(mailbox.domain, "doe.com");
        assert_eq!(mailbox.to_string(), "john@doe.com");
    }

    #[test]
    fn formats_address_maps() {
        let mut addresses = AddressMap::new();
        addresses.insert("jane@doe.com".into(), Some("Jane".into()));
        addresses.insert("john@doe.com".into(), None);

        assert_eq!(
            format_address_map(&addresses),
            "Jane <jane@doe.com>, john@doe.com"
        );
    }
}
