//! Sync engine settings.
//!
//! Settings come from an optional JSON file, then `SCORESYNC_*` environment
//! overrides, then validation. Every field has a default so an empty or
//! missing file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::ConflictPolicy;
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
const DEFAULT_INITIAL_DELAY_SECONDS: u64 = 30;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_MAX_BACKOFF_MINUTES: u64 = 120;
const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 10;
const DEFAULT_CONFLICT_RETENTION_DAYS: u32 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Read-only inputs to the sync engine and its scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncSettings {
    pub sync_interval_minutes: u64,
    pub initial_delay_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub conflict_policy: ConflictPolicy,
    pub max_backoff_minutes: u64,
    pub shutdown_grace_seconds: u64,
    pub conflict_retention_days: u32,
    pub request_timeout_seconds: u64,
    pub api_base_url: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            initial_delay_seconds: DEFAULT_INITIAL_DELAY_SECONDS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            conflict_policy: ConflictPolicy::default(),
            max_backoff_minutes: DEFAULT_MAX_BACKOFF_MINUTES,
            shutdown_grace_seconds: DEFAULT_SHUTDOWN_GRACE_SECONDS,
            conflict_retention_days: DEFAULT_CONFLICT_RETENTION_DAYS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            api_base_url: None,
        }
    }
}

impl SyncSettings {
    /// Parse settings from a JSON document. Unknown keys are rejected.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|error| Error::Config(format!("invalid settings: {error}")))
    }

    /// Load settings from a JSON file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&raw).map_err(|error| match error {
                Error::Config(message) => Error::Config(format!("{}: {message}", path.display())),
                other => other,
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Apply `SCORESYNC_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `SCORESYNC_*` overrides read through `lookup`, then validate
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = parsed(&lookup, "SCORESYNC_SYNC_INTERVAL_MINUTES")? {
            self.sync_interval_minutes = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_INITIAL_DELAY_SECONDS")? {
            self.initial_delay_seconds = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_BATCH_SIZE")? {
            self.batch_size = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_MAX_ATTEMPTS")? {
            self.max_attempts = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_CONFLICT_POLICY")? {
            self.conflict_policy = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_MAX_BACKOFF_MINUTES")? {
            self.max_backoff_minutes = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_SHUTDOWN_GRACE_SECONDS")? {
            self.shutdown_grace_seconds = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_CONFLICT_RETENTION_DAYS")? {
            self.conflict_retention_days = value;
        }
        if let Some(value) = parsed(&lookup, "SCORESYNC_REQUEST_TIMEOUT_SECONDS")? {
            self.request_timeout_seconds = value;
        }
        if let Some(url) = optional_trimmed(&lookup, "SCORESYNC_API_URL") {
            self.api_base_url = Some(url);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_minutes == 0 {
            return Err(Error::Config(
                "sync_interval_minutes must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than zero".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be greater than zero".to_string()));
        }
        if self.max_backoff_minutes < self.sync_interval_minutes {
            return Err(Error::Config(
                "max_backoff_minutes must be at least sync_interval_minutes".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(Error::Config(
                "request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = normalize_text_option(self.api_base_url.clone()) {
            if !is_http_url(&url) {
                return Err(Error::Config(
                    "api_base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes.saturating_mul(60))
    }

    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }

    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_minutes.saturating_mul(60))
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Configured API base URL without a trailing slash
    pub fn api_base_url(&self) -> Option<String> {
        normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string())
    }
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

fn parsed<T>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_trimmed(lookup, name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|error| Error::Config(format!("{name} is invalid: {error}")))
        })
        .transpose()
}
