//! Conflict classification and resolution.
//!
//! Everything here is pure: it looks at a local record and the server's copy
//! and decides what happened and what the record should become. Persisting
//! the result is the engine's job.

use std::collections::BTreeMap;

use crate::models::{
    ConflictType, GameScoreRecord, NewSyncConflict, Resolution, ResolvedRecord, ScorePayload,
    SyncConflict, SyncStatus, GAME_SCORE_ENTITY,
};

use super::transport::ServerScore;

const METADATA_FIELD_PREFIX: &str = "metadata.";

/// Classify how `local` diverged from the server's copy, if it did.
///
/// `server` is `None` when the server reports it has no such record.
pub fn classify(local: &GameScoreRecord, server: Option<&ServerScore>) -> Option<ConflictType> {
    let Some(server) = server else {
        // A record never edited past its first version was simply not
        // uploaded yet; there is nothing the server could have deleted.
        return (local.local_version > 1).then_some(ConflictType::DeleteConflict);
    };

    if server.version < local.server_version {
        return Some(ConflictType::VersionMismatch);
    }

    let unsynced = local.local_version > local.server_version;
    let diverged =
        server.version != local.server_version || server.content_hash != local.content_hash;
    (unsynced && diverged).then_some(ConflictType::UpdateConflict)
}

/// Conflict rows to record for `local`: one whole-entity row, plus one
/// field row per metadata key the server copy does not have.
///
/// Returns nothing when [`classify`] finds no conflict.
pub fn detect(local: &GameScoreRecord, server: Option<&ServerScore>) -> Vec<NewSyncConflict> {
    let Some(conflict_type) = classify(local, server) else {
        return Vec::new();
    };

    let entity_id = local.id.to_string();
    let server_version = server.map_or(local.server_version, |server| server.version);
    let server_timestamp = server.and_then(|server| server.modified_at);

    let mut conflicts = vec![NewSyncConflict {
        entity_type: GAME_SCORE_ENTITY.to_string(),
        entity_id: entity_id.clone(),
        field_name: None,
        local_value: serde_json::to_string(&local.payload).ok(),
        server_value: server.and_then(|server| serde_json::to_string(&server.payload).ok()),
        local_version: local.local_version,
        server_version,
        local_timestamp: local.modified_at,
        server_timestamp,
        conflict_type,
    }];

    let server_metadata = server.map(|server| &server.payload.metadata);
    for (key, value) in local_only_metadata(&local.payload.metadata, server_metadata) {
        conflicts.push(NewSyncConflict {
            entity_type: GAME_SCORE_ENTITY.to_string(),
            entity_id: entity_id.clone(),
            field_name: Some(format!("{METADATA_FIELD_PREFIX}{key}")),
            local_value: serde_json::to_string(value).ok(),
            server_value: None,
            local_version: local.local_version,
            server_version,
            local_timestamp: local.modified_at,
            server_timestamp,
            conflict_type,
        });
    }

    conflicts
}

/// Rebuild the server's copy from a persisted whole-entity conflict row.
///
/// Returns `None` for delete conflicts, where the server had no copy.
pub fn server_copy(conflict: &SyncConflict) -> Option<ServerScore> {
    let payload: ScorePayload = serde_json::from_str(conflict.server_value.as_deref()?).ok()?;
    Some(ServerScore {
        modified_at: conflict.server_timestamp,
        ..ServerScore::new(conflict.server_version, payload)
    })
}

/// Compute the record state that applying `resolution` produces.
///
/// Returns `None` for [`Resolution::Pending`].
pub fn resolve_record(
    local: &GameScoreRecord,
    server: Option<&ServerScore>,
    resolution: Resolution,
) -> Option<ResolvedRecord> {
    let Some(server) = server else {
        return resolve_deleted(local, resolution);
    };

    let acknowledged = local.server_version.max(server.version);
    match resolution {
        Resolution::Pending => None,
        Resolution::KeepServer => Some(adopt_server(server, acknowledged)),
        Resolution::KeepLocal => Some(reupload(local.payload.clone(), local, acknowledged)),
        Resolution::Merge => {
            let merged = merge_payloads(&local.payload, &server.payload);
            if merged == server.payload {
                Some(adopt_server(server, acknowledged))
            } else {
                Some(reupload(merged, local, acknowledged))
            }
        }
    }
}

/// Server payload plus every metadata entry only the device has.
pub fn merge_payloads(local: &ScorePayload, server: &ScorePayload) -> ScorePayload {
    let mut merged = server.clone();
    for (key, value) in local_only_metadata(&local.metadata, Some(&server.metadata)) {
        merged.metadata.insert(key.clone(), value.clone());
    }
    merged
}

fn resolve_deleted(local: &GameScoreRecord, resolution: Resolution) -> Option<ResolvedRecord> {
    match resolution {
        Resolution::Pending => None,
        // Accept the deletion: the row stays, but nothing is left to upload.
        Resolution::KeepServer => Some(ResolvedRecord {
            payload: local.payload.clone(),
            local_version: local.local_version,
            server_version: local.local_version,
            status: SyncStatus::Synced,
        }),
        Resolution::KeepLocal | Resolution::Merge => Some(reupload(
            local.payload.clone(),
            local,
            local.server_version,
        )),
    }
}

fn adopt_server(server: &ServerScore, acknowledged: i64) -> ResolvedRecord {
    ResolvedRecord {
        payload: server.payload.clone(),
        local_version: acknowledged,
        server_version: acknowledged,
        status: SyncStatus::Synced,
    }
}

fn reupload(payload: ScorePayload, local: &GameScoreRecord, acknowledged: i64) -> ResolvedRecord {
    ResolvedRecord {
        payload,
        local_version: local.local_version.max(acknowledged + 1),
        server_version: acknowledged,
        status: SyncStatus::Pending,
    }
}

fn local_only_metadata<'a>(
    local: &'a BTreeMap<String, String>,
    server: Option<&'a BTreeMap<String, String>>,
) -> impl Iterator<Item = (&'a String, &'a String)> {
    local
        .iter()
        .filter(move |(key, _)| !server.is_some_and(|server| server.contains_key(*key)))
}
