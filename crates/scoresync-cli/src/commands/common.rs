use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use scoresync_core::config::SyncSettings;
use scoresync_core::db::Database;
use scoresync_core::models::{SyncConflict, SyncLog};
use scoresync_core::sync::{
    AccessToken, HttpScoreTransport, StaticDeviceIdentity, SyncEngine, SyncStores,
};
use scoresync_core::util::normalize_text_option;
use scoresync_core::{GameScoreRecord, RecordId};
use serde::Serialize;

use crate::error::CliError;

pub const DEFAULT_DEVICE_ID: &str = "scoresync-cli";
const SHORT_ID_CHARS: usize = 13;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub owner_id: String,
    pub game_id: String,
    pub score: i64,
    pub max_score: i64,
    pub percentage: Option<f64>,
    pub played_at: i64,
    pub played_at_iso: String,
    pub relative_time: String,
    pub status: String,
    pub local_version: i64,
    pub server_version: i64,
    pub sync_attempts: u32,
    pub last_sync_error: Option<String>,
}

pub fn record_to_list_item(record: &GameScoreRecord, now_ms: i64) -> RecordListItem {
    RecordListItem {
        id: record.id.to_string(),
        owner_id: record.owner_id.clone(),
        game_id: record.game_id.clone(),
        score: record.payload.score,
        max_score: record.payload.max_score,
        percentage: record.payload.percentage(),
        played_at: record.played_at,
        played_at_iso: format_sync_timestamp(record.played_at),
        relative_time: format_relative_time(record.played_at, now_ms),
        status: record.sync_status.to_string(),
        local_version: record.local_version,
        server_version: record.server_version,
        sync_attempts: record.sync_attempts,
        last_sync_error: record.last_sync_error.clone(),
    }
}

pub fn format_record_lines(records: &[GameScoreRecord], now_ms: i64) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let mut line = format!(
                "{}  {:<8}  {}  {}/{}  v{}/{}  {}",
                short_id(&record.id.to_string()),
                record.sync_status.as_str(),
                record.game_id,
                record.payload.score,
                record.payload.max_score,
                record.local_version,
                record.server_version,
                format_relative_time(record.played_at, now_ms)
            );
            if let Some(error) = &record.last_sync_error {
                line.push_str(&format!("  ({} attempts: {error})", record.sync_attempts));
            }
            line
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let target = conflict.field_name.as_ref().map_or_else(
                || short_id(&conflict.entity_id),
                |field| format!("{}.{field}", short_id(&conflict.entity_id)),
            );
            let resolution = conflict.resolved_by.map_or_else(
                || conflict.resolution.to_string(),
                |by| format!("{} by {by}", conflict.resolution),
            );
            format!(
                "#{:<5} {}  {:<16}  {target}  local=v{} server=v{}  {resolution}",
                conflict.id,
                format_sync_timestamp(conflict.created_at),
                conflict.conflict_type.as_str(),
                conflict.local_version,
                conflict.server_version,
            )
        })
        .collect()
}

pub fn format_log_lines(logs: &[SyncLog]) -> Vec<String> {
    logs.iter()
        .map(|log| {
            let outcome = match (log.is_complete(), log.success) {
                (false, _) => "running",
                (true, true) => "ok",
                (true, false) => "FAILED",
            };
            let mut line = format!(
                "#{:<5} {}  {:<7} {:<7}  uploaded={} failed={} conflicts={}/{} bytes={}",
                log.id,
                format_sync_timestamp(log.sync_started_at),
                log.sync_type.as_str(),
                outcome,
                log.scores_uploaded,
                log.scores_failed,
                log.conflicts_resolved,
                log.conflicts_detected,
                log.bytes_transferred,
            );
            if let Some(duration) = log.duration_ms() {
                line.push_str(&format!(" {duration}ms"));
            }
            if let Some(error) = &log.error_message {
                line.push_str(&format!("  {error}"));
            }
            line
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_CHARS).collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse `KEY=VALUE` entries. Values may be empty; keys may not.
pub fn parse_metadata(entries: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| CliError::InvalidMetadata(entry.clone()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::InvalidMetadata(entry.clone()));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn parse_record_id(raw: &str) -> Result<RecordId, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyRecordId);
    }
    trimmed
        .parse()
        .map_err(|_| CliError::InvalidRecordId(trimmed.to_string()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("SCORESYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scoresync")
        .join("scores.db")
}

pub fn resolve_config_path(cli_config: Option<PathBuf>) -> PathBuf {
    cli_config
        .or_else(|| env::var_os("SCORESYNC_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scoresync")
        .join("config.json")
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path)?)
}

pub fn load_settings(path: &Path) -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::load_from_path(path)?.with_env_overrides()?)
}

pub fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Device this CLI records scores as
pub fn device_id_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    normalize_text_option(lookup("SCORESYNC_DEVICE_ID"))
        .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string())
}

pub fn device_identity_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<StaticDeviceIdentity, CliError> {
    let device_id =
        normalize_text_option(lookup("SCORESYNC_DEVICE_ID")).ok_or(CliError::DeviceNotConfigured)?;
    let token = lookup("SCORESYNC_DEVICE_TOKEN")
        .and_then(AccessToken::new)
        .ok_or(CliError::DeviceNotConfigured)?;

    let identity = StaticDeviceIdentity::new(device_id, Some(token));
    match normalize_text_option(lookup("SCORESYNC_DEVICE_TOKEN_EXPIRES_AT")) {
        Some(raw) => {
            let expires_at = raw.parse::<i64>().map_err(|_| {
                CliError::Config(format!(
                    "SCORESYNC_DEVICE_TOKEN_EXPIRES_AT must be Unix seconds, got '{raw}'"
                ))
            })?;
            Ok(identity.expires_at(expires_at))
        }
        None => Ok(identity),
    }
}

/// Engine uploading over HTTP as the device configured in the environment
pub fn build_engine(db: &Database, settings: &SyncSettings) -> Result<SyncEngine, CliError> {
    let base_url = settings.api_base_url().ok_or(CliError::ApiNotConfigured)?;
    let transport = HttpScoreTransport::new(base_url, settings.request_timeout())?;
    let identity = device_identity_from(env_lookup)?;
    tracing::debug!("Uploading to {} as {identity:?}", transport.endpoint());

    Ok(
        SyncEngine::builder(SyncStores::sqlite(db), Arc::new(transport), Arc::new(identity))
            .settings(settings)
            .build(),
    )
}
