//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a local record diverged from the server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Both sides changed the record since the last acknowledged version
    UpdateConflict,
    /// The server no longer has a record the device has edited
    DeleteConflict,
    /// Versions admit no causal order (e.g. the server version went backwards)
    VersionMismatch,
}

/// Outcome chosen for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Pending,
    KeepLocal,
    KeepServer,
    Merge,
}

/// Who resolved a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Auto,
    User,
    ServerWins,
}

macro_rules! string_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        concat!("unknown ", stringify!($ty), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(ConflictType {
    UpdateConflict => "UPDATE_CONFLICT",
    DeleteConflict => "DELETE_CONFLICT",
    VersionMismatch => "VERSION_MISMATCH",
});

string_enum!(Resolution {
    Pending => "PENDING",
    KeepLocal => "KEEP_LOCAL",
    KeepServer => "KEEP_SERVER",
    Merge => "MERGE",
});

string_enum!(ResolvedBy {
    Auto => "auto",
    User => "user",
    ServerWins => "server_wins",
});

/// Detected divergence, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncConflict {
    pub entity_type: String,
    pub entity_id: String,
    /// `None` for a whole-entity conflict
    pub field_name: Option<String>,
    pub local_value: Option<String>,
    pub server_value: Option<String>,
    pub local_version: i64,
    pub server_version: i64,
    pub local_timestamp: i64,
    pub server_timestamp: Option<i64>,
    pub conflict_type: ConflictType,
}

/// Persisted conflict, kept for resolution and audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: Option<String>,
    /// JSON of the local value at detection time
    pub local_value: Option<String>,
    /// JSON of the server value; `None` when the server has no such value
    pub server_value: Option<String>,
    pub local_version: i64,
    pub server_version: i64,
    pub local_timestamp: i64,
    pub server_timestamp: Option<i64>,
    pub conflict_type: ConflictType,
    pub resolution: Resolution,
    pub resolved_at: Option<i64>,
    pub resolved_by: Option<ResolvedBy>,
    pub created_at: i64,
}

impl SyncConflict {
    pub fn is_resolved(&self) -> bool {
        self.resolution != Resolution::Pending
    }

    /// Field-level conflict on a value the server has never seen.
    pub const fn is_local_only_field(&self) -> bool {
        self.field_name.is_some() && self.server_value.is_none()
    }
}
