//! Reconciler configuration.
//!
//! [`ReconcilerConfig`] holds the knobs a provider sets once: auto-create
//! default, directory page size, read-back filters and the retry policy.
//! It loads from JSON, and a small set of environment variables can override
//! it:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RECONCILER_RETRIES` | `retry.retries` |
//! | `RECONCILER_RETRY_WAIT` | `retry.retry_wait` (seconds) |
//! | `RECONCILER_RETRY_STATUS_CODES` | `retry.retry_status_codes` (comma separated) |
//! | `RECONCILER_AUTO_CREATE_USERS` | `auto_create_users` |
//!
//! Overrides go through a lookup function, so tests can supply a map instead
//! of touching the process environment.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_RETRIES: &str = "RECONCILER_RETRIES";
pub const ENV_RETRY_WAIT: &str = "RECONCILER_RETRY_WAIT";
pub const ENV_RETRY_STATUS_CODES: &str = "RECONCILER_RETRY_STATUS_CODES";
pub const ENV_AUTO_CREATE_USERS: &str = "RECONCILER_AUTO_CREATE_USERS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range
    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
    /// An environment override could not be parsed
    #[error("Invalid value '{value}' for {variable}")]
    InvalidEnvValue { variable: String, value: String },
    /// The configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Serialization/deserialization error
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

/// Settings shared by every pass a [`Reconciler`](crate::Reconciler) runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Default for `ReconcileOptions::auto_create`.
    pub auto_create_users: bool,
    /// Directory listing page size.
    pub page_size: usize,
    /// Server admin login, excluded when observing organization membership.
    pub admin_user: Option<String>,
    /// Emails excluded when observing team membership.
    pub ignored_member_emails: Vec<String>,
    /// Exclude team members carrying sync labels when observing.
    pub ignore_externally_synced_members: bool,
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            auto_create_users: true,
            page_size: 1000,
            admin_user: Some("admin".to_string()),
            ignored_member_emails: vec!["admin@localhost".to_string()],
            ignore_externally_synced_members: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::new()
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "Page size must be greater than 0".to_string(),
            });
        }
        self.retry.validate()
    }

    /// Apply environment overrides read through `lookup`, then re-validate.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_RETRIES) {
            self.retry.retries = parse_env(ENV_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_WAIT) {
            self.retry.retry_wait = parse_env(ENV_RETRY_WAIT, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_STATUS_CODES) {
            self.retry.retry_status_codes = value
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup(ENV_AUTO_CREATE_USERS) {
            self.auto_create_users = parse_bool(ENV_AUTO_CREATE_USERS, &value)?;
        }
        self.validate()
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|name| std::env::var(name).ok())
    }
}

fn invalid_env(variable: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvValue {
        variable: variable.to_string(),
        value: value.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(variable: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid_env(variable, value))
}

fn parse_bool(variable: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid_env(variable, value)),
    }
}

/// Builder for [`ReconcilerConfig`] with validation on `build`.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfigBuilder {
    config: ReconcilerConfig,
}

impl ReconcilerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_create_users(mut self, enabled: bool) -> Self {
        self.config.auto_create_users = enabled;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn admin_user(mut self, login: Option<String>) -> Self {
        self.config.admin_user = login;
        self
    }

    pub fn ignore_member_email(mut self, email: impl Into<String>) -> Self {
        self.config.ignored_member_emails.push(email.into());
        self
    }

    pub fn ignore_externally_synced_members(mut self, ignore: bool) -> Self {
        self.config.ignore_externally_synced_members = ignore;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> Result<ReconcilerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
