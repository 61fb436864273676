//! Automatic conflict resolution policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{Resolution, ResolvedBy, SyncConflict};

/// Decides whether a detected conflict can be resolved without a person.
///
/// Returning `None` leaves the conflict pending and the record in
/// `CONFLICT` until someone resolves it explicitly.
pub trait ResolutionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, conflict: &SyncConflict) -> Option<(Resolution, ResolvedBy)>;
}

/// Built-in policies, selectable by name from settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The server grades scores, so its copy wins. Metadata the server has
    /// never seen is merged in rather than dropped.
    #[default]
    ServerWins,
    /// The device copy wins and is uploaded again on top of the server's.
    ClientWins,
    /// Never auto-resolve.
    Manual,
}

impl ConflictPolicy {
    pub const ALL: [Self; 3] = [Self::ServerWins, Self::ClientWins, Self::Manual];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::ClientWins => "client_wins",
            Self::Manual => "manual",
        }
    }
}

impl ResolutionPolicy for ConflictPolicy {
    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn resolve(&self, conflict: &SyncConflict) -> Option<(Resolution, ResolvedBy)> {
        match self {
            Self::Manual => None,
            _ if conflict.is_local_only_field() => Some((Resolution::Merge, ResolvedBy::Auto)),
            Self::ServerWins => Some((Resolution::KeepServer, ResolvedBy::ServerWins)),
            Self::ClientWins => Some((Resolution::KeepLocal, ResolvedBy::Auto)),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown conflict policy '{}' (expected server_wins, client_wins, or manual)",
                    s.trim()
                ))
            })
    }
}
