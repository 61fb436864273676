//! Sync log model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of sync round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    /// No checkpoint yet: every pending record is eligible
    Full,
    /// Scheduled round bounded by the checkpoint
    Delta,
    /// On-demand round bounded by the checkpoint
    Manual,
}

impl SyncType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Delta => "DELTA",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "FULL" => Ok(Self::Full),
            "DELTA" => Ok(Self::Delta),
            "MANUAL" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!("unknown sync type '{other}'"))),
        }
    }
}

/// Counters collected while a round runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub scores_uploaded: u32,
    pub scores_failed: u32,
    pub bytes_transferred: u64,
    pub conflicts_detected: u32,
    pub conflicts_resolved: u32,
    pub success: bool,
    pub error_message: Option<String>,
}

impl RoundSummary {
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }

    pub const fn succeeded(mut self) -> Self {
        self.success = true;
        self
    }
}

/// One row of sync history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub sync_started_at: i64,
    /// `None` while the round is still running
    pub sync_completed_at: Option<i64>,
    pub sync_type: SyncType,
    pub scores_uploaded: u32,
    pub scores_failed: u32,
    pub bytes_transferred: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub conflicts_detected: u32,
    pub conflicts_resolved: u32,
}

impl SyncLog {
    pub const fn is_complete(&self) -> bool {
        self.sync_completed_at.is_some()
    }

    /// Round duration in milliseconds, once completed.
    pub fn duration_ms(&self) -> Option<i64> {
        self.sync_completed_at
            .map(|completed| completed.saturating_sub(self.sync_started_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_requires_completion() {
        let mut log = SyncLog {
            id: 1,
            sync_started_at: 1_000,
            sync_completed_at: None,
            sync_type: SyncType::Delta,
            scores_uploaded: 0,
            scores_failed: 0,
            bytes_transferred: 0,
            success: false,
            error_message: None,
            conflicts_detected: 0,
            conflicts_resolved: 0,
        };
        assert_eq!(log.duration_ms(), None);
        assert!(!log.is_complete());

        log.sync_completed_at = Some(1_250);
        assert_eq!(log.duration_ms(), Some(250));
    }

    #[test]
    fn test_summary_builders() {
        let ok = RoundSummary::default().succeeded();
        assert!(ok.success);

        let failed = RoundSummary::default().failed("network down");
        assert!(!failed.success);
        assert_eq!(failed.error_message.as_deref(), Some("network down"));
    }
}
