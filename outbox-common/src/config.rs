//! Runtime configuration for the queue engine.
//!
//! A single [`Config`] value is built once (usually deserialized from the
//! TOML configuration file) and passed explicitly into the composer, store,
//! sender, and runner. There is no global configuration access.

use std::time::Duration;

use serde::Deserialize;

use crate::address::NamedAddress;

/// Configuration recognised by the queue engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// How many times a record may be attempted before it is marked failed.
    ///
    /// Values below 3 are clamped up to 3 by [`Config::max_attempts`].
    #[serde(default = "defaults::attempts")]
    pub attempts: u32,

    /// Upper bound on the number of records one runner cycle will send.
    #[serde(default = "defaults::limit")]
    pub limit: usize,

    /// Encrypt sensitive record fields before they are persisted.
    #[serde(default)]
    pub encrypt: bool,

    /// Base64-encoded 32-byte key. Required when `encrypt` is set.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Redirect all recipients to a single test inbox.
    #[serde(default)]
    pub testing: TestingConfig,

    /// Deliver records immediately after `send()` instead of waiting for
    /// the next runner cycle.
    #[serde(default)]
    pub send_immediately: bool,

    /// System-wide sender identity used when a record carries no `from`.
    #[serde(default)]
    pub from: Option<NamedAddress>,

    /// Wall-clock budget for one runner cycle, in seconds. Records that do
    /// not fit in the budget are left for the next cycle.
    #[serde(default = "defaults::cycle_budget_secs")]
    pub cycle_budget_secs: u64,

    /// How long terminal records are kept before `prune` removes them.
    #[serde(default = "defaults::retention_days")]
    pub retention_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attempts: defaults::attempts(),
            limit: defaults::limit(),
            encrypt: false,
            encryption_key: None,
            testing: TestingConfig::default(),
            send_immediately: false,
            from: None,
            cycle_budget_secs: defaults::cycle_budget_secs(),
            retention_days: defaults::retention_days(),
        }
    }
}

impl Config {
    /// Maximum attempt count, clamped to a floor of 3.
    ///
    /// A lower configured value would make a single transient provider
    /// hiccup terminal, so the floor is not configurable.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        if self.attempts < 3 { 3 } else { self.attempts }
    }

    /// Wall-clock budget for one runner cycle.
    #[must_use]
    pub const fn cycle_budget(&self) -> Duration {
        Duration::from_secs(self.cycle_budget_secs)
    }

    /// Retention window for terminal records.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// Test-inbox redirection.
///
/// When enabled, every newly composed record is stored with the recipient
/// replaced by `email` and cc/bcc cleared. The substitution happens after
/// validation, so malformed input is still rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct TestingConfig {
    /// Whether the redirection is active.
    #[serde(default)]
    pub enabled: bool,

    /// The inbox that receives all redirected mail.
    #[serde(default = "defaults::testing_email")]
    pub email: String,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email: defaults::testing_email(),
        }
    }
}

mod defaults {
    pub const fn attempts() -> u32 {
        3
    }

    pub const fn limit() -> usize {
        20
    }

    pub const fn cycle_budget_secs() -> u64 {
        300
    }

    pub const fn retention_days() -> u32 {
        180
    }

    pub fn testing_email() -> String {
        "test@example.com".to_string()
    }
}
