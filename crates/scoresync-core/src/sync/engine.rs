//! Sync orchestrator.
//!
//! One [`SyncEngine`] owns a device's upload loop: it picks a bounded batch
//! of pending scores, uploads it, applies each per-record verdict to the
//! local store, advances the checkpoint and writes a sync log row. At most
//! one round runs at a time; a trigger that arrives while a round is in
//! flight is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::SyncSettings;
use crate::db::{
    CheckpointStore, ConflictStore, Database, RecordStore, SqliteCheckpointRepository,
    SqliteConflictRepository, SqliteRecordRepository, SqliteSyncLogRepository, SyncLogStore,
};
use crate::error::Error;
use crate::models::{
    ConflictType, GameScoreRecord, RecordId, Resolution, ResolvedBy, RoundSummary,
    SyncCheckpoint, SyncStatus, SyncType, GAME_SCORE_ENTITY,
};
use crate::state::SyncState;
use crate::util::unix_millis_now;

use super::identity::{AlwaysOnline, AuthError, Connectivity, DeviceIdentity};
use super::policy::{ConflictPolicy, ResolutionPolicy};
use super::resolver;
use super::transport::{
    OutcomeKind, RecordOutcome, ScoreTransport, ServerScore, TransportError, UploadBatch,
};

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const ROUND_CANCELLED: &str = "round cancelled";
const MISSING_OUTCOME: &str = "server returned no outcome for this record";
const CONFLICT_WITHOUT_COPY: &str = "server reported a conflict without a server copy";

/// What aborts a round. Record-level failures never do.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("Storage error: {0}")]
    Storage(#[from] Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Failed to encode upload batch: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Why a round was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTrigger {
    Scheduled,
    Manual,
}

/// Result of one finished round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    /// `None` if the log row itself could not be written
    pub log_id: Option<i64>,
    pub sync_type: SyncType,
    pub summary: RoundSummary,
    pub message: String,
}

#[derive(Debug)]
pub enum RoundOutcome {
    Completed(RoundReport),
    Failed {
        report: RoundReport,
        error: RoundError,
    },
    /// Another round was already running
    Skipped,
    /// No network; nothing was attempted
    Offline { pending: usize },
}

impl RoundOutcome {
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub const fn report(&self) -> Option<&RoundReport> {
        match self {
            Self::Completed(report) | Self::Failed { report, .. } => Some(report),
            Self::Skipped | Self::Offline { .. } => None,
        }
    }
}

/// Snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub state: SyncState,
    pub last_message: Option<String>,
    /// Unix ms of the last finished round
    pub last_round_at: Option<i64>,
    pub pending: usize,
    pub conflicts: usize,
    pub errors: usize,
    pub unresolved_conflicts: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub conflicts: usize,
    pub logs: usize,
}

/// The storage ports a [`SyncEngine`] works against
#[derive(Clone)]
pub struct SyncStores {
    pub records: Arc<dyn RecordStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub conflicts: Arc<dyn ConflictStore>,
    pub logs: Arc<dyn SyncLogStore>,
}

impl SyncStores {
    /// All four stores backed by one `SQLite` database
    pub fn sqlite(db: &Database) -> Self {
        Self {
            records: Arc::new(SqliteRecordRepository::new(db.clone())),
            checkpoints: Arc::new(SqliteCheckpointRepository::new(db.clone())),
            conflicts: Arc::new(SqliteConflictRepository::new(db.clone())),
            logs: Arc::new(SqliteSyncLogRepository::new(db.clone())),
        }
    }
}

#[derive(Debug, Default)]
struct StatusCell {
    last_message: Option<String>,
    last_round_at: Option<i64>,
}

pub struct SyncEngine {
    records: Arc<dyn RecordStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    conflicts: Arc<dyn ConflictStore>,
    logs: Arc<dyn SyncLogStore>,
    transport: Arc<dyn ScoreTransport>,
    identity: Arc<dyn DeviceIdentity>,
    connectivity: Arc<dyn Connectivity>,
    policy: Arc<dyn ResolutionPolicy>,
    batch_size: usize,
    max_attempts: u32,
    syncing: AtomicBool,
    state: watch::Sender<SyncState>,
    status: Mutex<StatusCell>,
}

pub struct SyncEngineBuilder {
    stores: SyncStores,
    transport: Arc<dyn ScoreTransport>,
    identity: Arc<dyn DeviceIdentity>,
    connectivity: Arc<dyn Connectivity>,
    policy: Arc<dyn ResolutionPolicy>,
    batch_size: usize,
    max_attempts: u32,
}

impl SyncEngineBuilder {
    #[must_use]
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn ResolutionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Take batch size, attempt bound and conflict policy from settings
    #[must_use]
    pub fn settings(self, settings: &SyncSettings) -> Self {
        self.batch_size(settings.batch_size)
            .max_attempts(settings.max_attempts)
            .policy(Arc::new(settings.conflict_policy))
    }

    pub fn build(self) -> SyncEngine {
        let (state, _) = watch::channel(SyncState::Idle);
        SyncEngine {
            records: self.stores.records,
            checkpoints: self.stores.checkpoints,
            conflicts: self.stores.conflicts,
            logs: self.stores.logs,
            transport: self.transport,
            identity: self.identity,
            connectivity: self.connectivity,
            policy: self.policy,
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            syncing: AtomicBool::new(false),
            state,
            status: Mutex::new(StatusCell::default()),
        }
    }
}

impl SyncEngine {
    pub fn builder(
        stores: SyncStores,
        transport: Arc<dyn ScoreTransport>,
        identity: Arc<dyn DeviceIdentity>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            stores,
            transport,
            identity,
            connectivity: Arc::new(AlwaysOnline),
            policy: Arc::new(ConflictPolicy::default()),
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Run an on-demand round
    pub async fn sync_now(&self) -> RoundOutcome {
        self.run(RoundTrigger::Manual).await
    }

    /// Run one round unless offline or another round is in flight.
    ///
    /// Never returns an error: failures are logged, written to the sync log
    /// and reported through [`RoundOutcome::Failed`].
    pub async fn run(&self, trigger: RoundTrigger) -> RoundOutcome {
        if !self.connectivity.is_online() {
            let pending = self
                .records
                .count_by_status(SyncStatus::Pending)
                .unwrap_or_else(|error| {
                    tracing::warn!("Failed to count pending scores while offline: {error}");
                    0
                });
            tracing::debug!("Offline; skipping sync round with {pending} scores pending");
            self.lock_status().last_message = Some(format!(
                "Offline; {pending} scores waiting to sync"
            ));
            return RoundOutcome::Offline { pending };
        }

        let Some(mut guard) = RoundGuard::acquire(self) else {
            tracing::debug!("Sync round already in progress; ignoring {trigger:?} trigger");
            return RoundOutcome::Skipped;
        };

        let checkpoint = self.checkpoints.get_or_create(GAME_SCORE_ENTITY);
        let sync_type = checkpoint.as_ref().map_or_else(
            |_| fallback_sync_type(trigger),
            |checkpoint| sync_type_for(checkpoint, trigger),
        );
        guard.start_log(sync_type);
        tracing::info!("Starting {sync_type} sync round");

        let mut summary = RoundSummary::default();
        let result = match checkpoint {
            Ok(checkpoint) => self.execute(&checkpoint, sync_type, &mut summary).await,
            Err(error) => Err(RoundError::Storage(error)),
        };
        guard.finish(sync_type, summary, result)
    }

    async fn execute(
        &self,
        checkpoint: &SyncCheckpoint,
        sync_type: SyncType,
        summary: &mut RoundSummary,
    ) -> Result<String, RoundError> {
        let batch = match sync_type {
            SyncType::Full => self.records.find_pending(self.batch_size)?,
            SyncType::Delta | SyncType::Manual => self.records.find_pending_since(
                checkpoint.last_sync_timestamp.unwrap_or_default(),
                self.batch_size,
            )?,
        };
        if batch.is_empty() {
            return Ok("Nothing to sync".to_string());
        }

        let token = self.identity.refresh_if_needed().await?;
        let upload = UploadBatch::new(self.identity.device_id(), &batch);
        let encoded = serde_json::to_vec(&upload).map_err(RoundError::Encode)?;
        summary.bytes_transferred = u64::try_from(encoded.len()).unwrap_or(u64::MAX);
        tracing::debug!(
            "Uploading {} scores ({} bytes)",
            upload.len(),
            encoded.len()
        );

        let response = match self.transport.upload_scores(&token, &upload).await {
            Ok(response) => response,
            Err(error) => {
                let reason = error.to_string();
                for record in &batch {
                    self.records.increment_attempt(&record.id, &reason)?;
                }
                summary.scores_failed = count(batch.len());
                return Err(error.into());
            }
        };

        self.apply_outcomes(&batch, response.outcomes, summary)?;

        if sync_type == SyncType::Full && batch.len() >= self.batch_size {
            // More history may sit behind this batch in event-time order;
            // keep running full rounds until it drains.
            tracing::debug!("Full sync backlog not drained; checkpoint left initial");
        } else if let Some(batch_max) = batch.iter().map(|record| record.modified_at).max() {
            // Retried records can be older than the cursor; never move it back.
            let timestamp = checkpoint
                .last_sync_timestamp
                .map_or(batch_max, |last| last.max(batch_max));
            let advanced = self.checkpoints.advance(
                GAME_SCORE_ENTITY,
                checkpoint.last_sync_version,
                timestamp,
                response.sequence_id.as_deref(),
            )?;
            if advanced.is_none() {
                tracing::warn!(
                    "{GAME_SCORE_ENTITY} checkpoint moved during the round; leaving it as is"
                );
            }
        }

        Ok(round_message(summary, response.message.as_deref()))
    }

    fn apply_outcomes(
        &self,
        batch: &[GameScoreRecord],
        outcomes: Vec<RecordOutcome>,
        summary: &mut RoundSummary,
    ) -> Result<(), Error> {
        let by_id: HashMap<RecordId, &GameScoreRecord> =
            batch.iter().map(|record| (record.id, record)).collect();
        let mut answered = HashSet::new();

        for outcome in outcomes {
            let Some(record) = by_id.get(&outcome.id).copied() else {
                tracing::warn!("Ignoring outcome for score {} outside this batch", outcome.id);
                continue;
            };
            if !answered.insert(outcome.id) {
                tracing::warn!("Ignoring duplicate outcome for score {}", outcome.id);
                continue;
            }

            match outcome.kind {
                OutcomeKind::Accepted { server_version } => {
                    self.records.mark_synced(&record.id, server_version)?;
                    summary.scores_uploaded += 1;
                    tracing::debug!("Score {} accepted at version {server_version}", record.id);
                }
                OutcomeKind::Rejected { reason } => {
                    self.record_failure(&record.id, &reason)?;
                    summary.scores_failed += 1;
                }
                OutcomeKind::Conflict { server } => {
                    self.handle_conflict(record, server.as_ref(), summary)?;
                }
            }
        }

        for record in batch.iter().filter(|record| !answered.contains(&record.id)) {
            self.record_failure(&record.id, MISSING_OUTCOME)?;
            summary.scores_failed += 1;
        }
        Ok(())
    }

    fn record_failure(&self, id: &RecordId, reason: &str) -> Result<(), Error> {
        let attempts = self.records.increment_attempt(id, reason)?;
        if attempts >= self.max_attempts {
            self.records.mark_error(id, reason)?;
            tracing::warn!("Score {id} failed {attempts} times; marked ERROR: {reason}");
        } else {
            tracing::warn!("Score {id} not accepted (attempt {attempts}): {reason}");
        }
        Ok(())
    }

    fn handle_conflict(
        &self,
        uploaded: &GameScoreRecord,
        server: Option<&ServerScore>,
        summary: &mut RoundSummary,
    ) -> Result<(), Error> {
        // Re-read: the record may have been edited while the upload was in flight.
        let local = self
            .records
            .get(&uploaded.id)?
            .ok_or_else(|| Error::NotFound(format!("score record {}", uploaded.id)))?;

        let detected = resolver::detect(&local, server);
        if detected.is_empty() {
            let Some(server) = server else {
                self.record_failure(&local.id, CONFLICT_WITHOUT_COPY)?;
                summary.scores_failed += 1;
                return Ok(());
            };
            // The server copy is a fast-forward or a duplicate of ours.
            if let Some(adopted) = resolver::resolve_record(&local, Some(server), Resolution::KeepServer)
            {
                self.records.apply_resolution(&local.id, &adopted)?;
            }
            summary.scores_uploaded += 1;
            tracing::debug!("Score {} already current on the server", local.id);
            return Ok(());
        }

        let mut stored = Vec::with_capacity(detected.len());
        for conflict in &detected {
            stored.push(self.conflicts.insert(conflict)?);
        }
        summary.conflicts_detected += count(stored.len());
        let server_version = server.map_or(local.server_version, |server| server.version);
        self.records.mark_conflict(&local.id, server_version)?;

        let Some((entity, fields)) = stored.split_first() else {
            return Ok(());
        };
        let decision = self
            .policy
            .resolve(entity)
            .filter(|(resolution, _)| *resolution != Resolution::Pending);
        let Some((resolution, resolved_by)) = decision else {
            tracing::info!(
                "Score {} has a {} with the server; left for manual resolution",
                local.id,
                entity.conflict_type
            );
            return Ok(());
        };

        let mut effective = resolution;
        for field in fields {
            let Some((field_resolution, field_by)) = self
                .policy
                .resolve(field)
                .filter(|(resolution, _)| *resolution != Resolution::Pending)
            else {
                continue;
            };
            if self.conflicts.resolve(field.id, field_resolution, field_by)? {
                summary.conflicts_resolved += 1;
            }
            if field_resolution == Resolution::Merge && effective == Resolution::KeepServer {
                effective = Resolution::Merge;
            }
        }

        if let Some(resolved) = resolver::resolve_record(&local, server, effective) {
            self.records.apply_resolution(&local.id, &resolved)?;
        }
        if self.conflicts.resolve(entity.id, resolution, resolved_by)? {
            summary.conflicts_resolved += 1;
        }
        tracing::info!(
            "Resolved {} on score {} as {effective} ({})",
            entity.conflict_type,
            local.id,
            self.policy.name()
        );
        Ok(())
    }

    /// Apply an operator's decision to a pending conflict.
    ///
    /// Returns `false` if the conflict was already resolved. Resolving the
    /// whole-entity row also applies the decision to the record and closes
    /// any field rows still open for it.
    pub fn resolve_conflict(&self, conflict_id: i64, resolution: Resolution) -> Result<bool, Error> {
        if resolution == Resolution::Pending {
            return Err(Error::InvalidInput(
                "choose KEEP_LOCAL, KEEP_SERVER, or MERGE".to_string(),
            ));
        }

        let conflict = self
            .conflicts
            .get(conflict_id)?
            .ok_or_else(|| Error::NotFound(format!("sync conflict {conflict_id}")))?;
        if conflict.is_resolved() {
            tracing::debug!("Conflict {conflict_id} already resolved as {}", conflict.resolution);
            return Ok(false);
        }
        if conflict.field_name.is_some() {
            return self
                .conflicts
                .resolve(conflict.id, resolution, ResolvedBy::User);
        }

        let record_id: RecordId = conflict.entity_id.parse().map_err(|error| {
            Error::InvalidInput(format!(
                "conflict {conflict_id} names an invalid record id: {error}"
            ))
        })?;
        let record = self
            .records
            .get(&record_id)?
            .ok_or_else(|| Error::NotFound(format!("score record {record_id}")))?;

        let server = resolver::server_copy(&conflict);
        if server.is_none() && conflict.conflict_type != ConflictType::DeleteConflict {
            return Err(Error::InvalidInput(format!(
                "conflict {conflict_id} has no readable server copy"
            )));
        }

        if record.sync_status == SyncStatus::Conflict {
            if let Some(resolved) = resolver::resolve_record(&record, server.as_ref(), resolution) {
                self.records.apply_resolution(&record.id, &resolved)?;
            }
        } else {
            tracing::warn!(
                "Score {record_id} is no longer in conflict; recording the decision only"
            );
        }

        let applied = self
            .conflicts
            .resolve(conflict.id, resolution, ResolvedBy::User)?;
        for open in self
            .conflicts
            .list_for_entity(&conflict.entity_type, &conflict.entity_id)?
            .into_iter()
            .filter(|open| !open.is_resolved())
        {
            self.conflicts.resolve(open.id, resolution, ResolvedBy::User)?;
        }

        tracing::info!("Conflict {conflict_id} on score {record_id} resolved as {resolution}");
        Ok(applied)
    }

    pub fn status(&self) -> Result<EngineStatus, Error> {
        let (last_message, last_round_at) = {
            let cell = self.lock_status();
            (cell.last_message.clone(), cell.last_round_at)
        };
        Ok(EngineStatus {
            state: self.state(),
            last_message,
            last_round_at,
            pending: self.records.count_by_status(SyncStatus::Pending)?,
            conflicts: self.records.count_by_status(SyncStatus::Conflict)?,
            errors: self.records.count_by_status(SyncStatus::Error)?,
            unresolved_conflicts: self.conflicts.count_unresolved()?,
        })
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Drop resolved conflicts and finished log rows older than the horizon
    pub fn prune(&self, retention_days: u32) -> Result<PruneReport, Error> {
        Ok(PruneReport {
            conflicts: self.conflicts.prune_resolved(retention_days)?,
            logs: self.logs.prune(retention_days)?,
        })
    }

    /// Give every `ERROR` record a fresh set of attempts
    pub fn requeue_failed(&self) -> Result<usize, Error> {
        let requeued = self.records.requeue_failed()?;
        if requeued > 0 {
            tracing::info!("Requeued {requeued} failed scores");
        }
        Ok(requeued)
    }

    /// Force the next round for `entity_type` to be a full sync
    pub fn reset_checkpoint(&self, entity_type: &str) -> Result<SyncCheckpoint, Error> {
        self.checkpoints.reset(entity_type)
    }

    fn finish_round(&self, state: SyncState, message: String) {
        {
            let mut cell = self.lock_status();
            cell.last_message = Some(message);
            cell.last_round_at = Some(unix_millis_now());
        }
        self.state.send_replace(state);
    }

    fn lock_status(&self) -> MutexGuard<'_, StatusCell> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the single-flight flag for one round.
///
/// If the round future is dropped before it finishes (e.g. on shutdown), the
/// log row is closed as cancelled and the flag is released.
struct RoundGuard<'a> {
    engine: &'a SyncEngine,
    log_id: Option<i64>,
    finished: bool,
}

impl<'a> RoundGuard<'a> {
    fn acquire(engine: &'a SyncEngine) -> Option<Self> {
        engine
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        engine.state.send_replace(SyncState::Syncing);
        Some(Self {
            engine,
            log_id: None,
            finished: false,
        })
    }

    fn start_log(&mut self, sync_type: SyncType) {
        match self.engine.logs.start(sync_type) {
            Ok(id) => self.log_id = Some(id),
            Err(error) => tracing::warn!("Failed to open sync log entry: {error}"),
        }
    }

    fn complete_log(&self, summary: &RoundSummary) {
        let Some(id) = self.log_id else {
            return;
        };
        if let Err(error) = self.engine.logs.complete(id, summary) {
            tracing::warn!("Failed to complete sync log entry {id}: {error}");
        }
    }

    fn finish(
        mut self,
        sync_type: SyncType,
        summary: RoundSummary,
        result: Result<String, RoundError>,
    ) -> RoundOutcome {
        self.finished = true;
        match result {
            Ok(message) => {
                let summary = summary.succeeded();
                self.complete_log(&summary);
                tracing::info!("Sync round finished: {message}");
                self.engine.finish_round(SyncState::Success, message.clone());
                RoundOutcome::Completed(RoundReport {
                    log_id: self.log_id,
                    sync_type,
                    summary,
                    message,
                })
            }
            Err(error) => {
                let message = format!("Sync failed: {error}");
                let summary = summary.failed(error.to_string());
                self.complete_log(&summary);
                tracing::error!("{message}");
                self.engine.finish_round(SyncState::Error, message.clone());
                RoundOutcome::Failed {
                    report: RoundReport {
                        log_id: self.log_id,
                        sync_type,
                        summary,
                        message,
                    },
                    error,
                }
            }
        }
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Sync round dropped before it finished");
            self.complete_log(&RoundSummary::default().failed(ROUND_CANCELLED));
            self.engine
                .finish_round(SyncState::Error, format!("Sync failed: {ROUND_CANCELLED}"));
        }
        self.engine.syncing.store(false, Ordering::Release);
    }
}

const fn sync_type_for(checkpoint: &SyncCheckpoint, trigger: RoundTrigger) -> SyncType {
    if checkpoint.is_initial() {
        SyncType::Full
    } else {
        fallback_sync_type(trigger)
    }
}

const fn fallback_sync_type(trigger: RoundTrigger) -> SyncType {
    match trigger {
        RoundTrigger::Manual => SyncType::Manual,
        RoundTrigger::Scheduled => SyncType::Delta,
    }
}

fn round_message(summary: &RoundSummary, server_message: Option<&str>) -> String {
    let mut message = format!("Synced {} scores", summary.scores_uploaded);
    if summary.scores_failed > 0 {
        message.push_str(&format!(", {} failed", summary.scores_failed));
    }
    if summary.conflicts_detected > 0 {
        message.push_str(&format!(
            ", {} conflicts ({} resolved)",
            summary.conflicts_detected, summary.conflicts_resolved
        ));
    }
    if let Some(server_message) = server_message.map(str::trim).filter(|m| !m.is_empty()) {
        message.push_str(&format!(" - {server_message}"));
    }
    message
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sync::identity::{AccessToken, ManualConnectivity, StaticDeviceIdentity};
    use crate::sync::testing::{payload, FakeScoreServer, Harness, DEVICE_ID};
    use crate::sync::transport::UploadResponse;

    fn report(outcome: &RoundOutcome) -> &RoundReport {
        outcome
            .report()
            .unwrap_or_else(|| panic!("round did not run: {outcome:?}"))
    }

    #[tokio::test]
    async fn empty_queue_completes_with_log() {
        let harness = Harness::new();

        let outcome = harness.engine.sync_now().await;
        let report = report(&outcome);
        assert!(!outcome.is_failure());
        assert_eq!(report.message, "Nothing to sync");
        assert_eq!(report.sync_type, SyncType::Full);

        let log = harness.stores.logs.last().unwrap().unwrap();
        assert!(log.success);
        assert!(log.is_complete());
        assert_eq!(harness.engine.state(), SyncState::Success);
        assert!(harness.server.requests().is_empty());
    }

    #[tokio::test]
    async fn uploads_pending_scores_and_advances_checkpoint() {
        let harness = Harness::new();
        let first = harness.record(80, 2_000);
        let second = harness.record(90, 1_000);

        let outcome = harness.engine.sync_now().await;
        let report = report(&outcome);
        assert_eq!(report.sync_type, SyncType::Full);
        assert_eq!(report.summary.scores_uploaded, 2);
        assert!(report.summary.bytes_transferred > 0);

        for id in [first.id, second.id] {
            let stored = harness.get(id);
            assert_eq!(stored.sync_status, SyncStatus::Synced);
            assert_eq!(stored.server_version, 1);
            assert_eq!(stored.sync_attempts, 0);
        }

        let requests = harness.server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].device_id, DEVICE_ID);
        assert_eq!(
            requests[0].scores.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );

        let checkpoint = harness
            .stores
            .checkpoints
            .get(GAME_SCORE_ENTITY)
            .unwrap()
            .unwrap();
        assert!(!checkpoint.is_initial());
        assert_eq!(checkpoint.last_sync_version, 1);
        assert_eq!(checkpoint.server_sequence_id.as_deref(), Some("seq-1"));

        let log = harness.stores.logs.last().unwrap().unwrap();
        assert_eq!(log.scores_uploaded, 2);
        assert_eq!(log.bytes_transferred, report.summary.bytes_transferred);
    }

    #[tokio::test]
    async fn later_rounds_are_delta_or_manual() {
        let harness = Harness::new();
        harness.record(80, 0);
        harness.engine.sync_now().await;

        harness.record(70, 0);
        let scheduled = harness.engine.run(RoundTrigger::Scheduled).await;
        assert_eq!(report(&scheduled).sync_type, SyncType::Delta);
        assert_eq!(report(&scheduled).summary.scores_uploaded, 1);

        let manual = harness.engine.sync_now().await;
        assert_eq!(report(&manual).sync_type, SyncType::Manual);
        assert_eq!(report(&manual).message, "Nothing to sync");
    }

    #[tokio::test]
    async fn four_accepted_one_conflict() {
        let harness = Harness::with_policy(ConflictPolicy::Manual);
        let records: Vec<_> = (0..5).map(|i| harness.record(60 + i, 5_000 - i)).collect();
        let contested = records[2].id;
        harness.server.put(contested, ServerScore::new(1, payload(10)));

        let outcome = harness.engine.sync_now().await;
        let report = report(&outcome);
        assert_eq!(report.summary.scores_uploaded, 4);
        assert_eq!(report.summary.conflicts_detected, 1);
        assert_eq!(report.summary.conflicts_resolved, 0);

        let records = &harness.stores.records;
        assert_eq!(records.count_by_status(SyncStatus::Synced).unwrap(), 4);
        assert_eq!(records.count_by_status(SyncStatus::Conflict).unwrap(), 1);
        assert_eq!(harness.get(contested).sync_status, SyncStatus::Conflict);
        assert_eq!(harness.get(contested).remote_version, Some(1));

        let conflicts = harness.stores.conflicts.list_unresolved().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity_id, contested.to_string());
        assert_eq!(conflicts[0].conflict_type, ConflictType::UpdateConflict);

        let log = harness.stores.logs.last().unwrap().unwrap();
        assert!(log.success);
        assert_eq!(log.scores_uploaded, 4);
        assert_eq!(log.conflicts_detected, 1);
    }

    #[tokio::test]
    async fn server_wins_resolves_conflicts_automatically() {
        let harness = Harness::new();
        let record = harness.record(80, 0);
        harness.server.put(record.id, ServerScore::new(1, payload(40)));

        let outcome = harness.engine.sync_now().await;
        let report = report(&outcome);
        assert_eq!(report.summary.conflicts_detected, 1);
        assert_eq!(report.summary.conflicts_resolved, 1);
        assert_eq!(report.summary.scores_uploaded, 0);

        let stored = harness.get(record.id);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.payload, payload(40));
        assert_eq!(stored.server_version, 1);
        assert_eq!(stored.content_hash, payload(40).content_hash());

        let conflict = harness.stores.conflicts.list_recent(1).unwrap().remove(0);
        assert_eq!(conflict.resolution, Resolution::KeepServer);
        assert_eq!(conflict.resolved_by, Some(ResolvedBy::ServerWins));
    }

    #[tokio::test]
    async fn local_only_metadata_survives_server_wins() {
        let harness = Harness::new();
        let mut record = GameScoreRecord::new("kid-1", "fractions", DEVICE_ID, payload(80));
        record
            .payload
            .metadata
            .insert("badge".into(), "gold".into());
        record.refresh_hash();
        harness.stores.records.enqueue(&record).unwrap();
        harness.server.put(record.id, ServerScore::new(1, payload(40)));

        let first = harness.engine.sync_now().await;
        assert_eq!(report(&first).summary.conflicts_detected, 2);
        assert_eq!(report(&first).summary.conflicts_resolved, 2);

        let merged = harness.get(record.id);
        assert_eq!(merged.sync_status, SyncStatus::Pending);
        assert_eq!(merged.payload.score, 40);
        assert_eq!(merged.server_version, 1);
        assert_eq!(merged.local_version, 2);

        let second = harness.engine.sync_now().await;
        assert_eq!(report(&second).summary.scores_uploaded, 1);
        let synced = harness.get(record.id);
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert_eq!(synced.server_version, 2);

        let on_server = harness.server.score(record.id).unwrap();
        assert_eq!(on_server.payload.score, 40);
        assert_eq!(
            on_server.payload.metadata.get("badge").map(String::as_str),
            Some("gold")
        );
    }

    #[tokio::test]
    async fn unreachable_server_keeps_everything_pending() {
        let harness = Harness::new();
        let records = [harness.record(80, 2_000), harness.record(90, 1_000)];
        harness.server.set_unreachable(true);

        let outcome = harness.engine.sync_now().await;
        assert!(matches!(
            outcome,
            RoundOutcome::Failed {
                error: RoundError::Transport(TransportError::Unreachable(_)),
                ..
            }
        ));
        assert_eq!(report(&outcome).summary.scores_failed, 2);

        for record in &records {
            let stored = harness.get(record.id);
            assert_eq!(stored.sync_status, SyncStatus::Pending);
            assert_eq!(stored.sync_attempts, 1);
            assert!(stored.last_sync_error.is_some());
        }

        let log = harness.stores.logs.last().unwrap().unwrap();
        assert!(!log.success);
        assert!(log.error_message.is_some());
        assert_eq!(harness.engine.state(), SyncState::Error);
        assert!(harness
            .stores
            .checkpoints
            .get(GAME_SCORE_ENTITY)
            .unwrap()
            .unwrap()
            .is_initial());

        // Outages never escalate to ERROR, however long they last.
        for _ in 0..6 {
            harness.engine.sync_now().await;
        }
        assert_eq!(harness.get(records[0].id).sync_status, SyncStatus::Pending);
        assert_eq!(harness.get(records[0].id).sync_attempts, 7);

        harness.server.set_unreachable(false);
        harness.engine.sync_now().await;
        assert_eq!(harness.get(records[0].id).sync_status, SyncStatus::Synced);
        assert_eq!(harness.get(records[0].id).sync_attempts, 0);
    }

    #[tokio::test]
    async fn rejected_scores_escalate_after_max_attempts() {
        let harness = Harness::build(ConflictPolicy::ServerWins, 50, 2);
        let record = harness.record(500, 0);
        harness.server.reject(record.id, "score exceeds max_score");

        let first = harness.engine.sync_now().await;
        assert!(!first.is_failure());
        assert_eq!(report(&first).summary.scores_failed, 1);
        let stored = harness.get(record.id);
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.sync_attempts, 1);
        assert_eq!(
            stored.last_sync_error.as_deref(),
            Some("score exceeds max_score")
        );

        harness.engine.sync_now().await;
        assert_eq!(harness.get(record.id).sync_status, SyncStatus::Error);

        // ERROR records are surfaced, not retried.
        let third = harness.engine.sync_now().await;
        assert_eq!(report(&third).message, "Nothing to sync");
        assert_eq!(harness.engine.status().unwrap().errors, 1);

        assert_eq!(harness.engine.requeue_failed().unwrap(), 1);
        let requeued = harness.get(record.id);
        assert_eq!(requeued.sync_status, SyncStatus::Pending);
        assert_eq!(requeued.sync_attempts, 0);
    }

    #[tokio::test]
    async fn lost_acknowledgement_is_not_applied_twice() {
        let harness = Harness::new();
        let record = harness.record(80, 0);
        harness.server.lose_next_response();

        let first = harness.engine.sync_now().await;
        assert!(first.is_failure());
        assert_eq!(harness.server.writes(), 1);
        assert_eq!(harness.get(record.id).sync_status, SyncStatus::Pending);

        let second = harness.engine.sync_now().await;
        assert_eq!(report(&second).summary.scores_uploaded, 1);
        assert_eq!(harness.server.writes(), 1);

        let stored = harness.get(record.id);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.server_version, 1);
        assert!(stored.local_version >= stored.server_version);
    }

    #[tokio::test]
    async fn versions_move_forward_with_local_edits() {
        let harness = Harness::new();
        let record = harness.record(80, 0);
        harness.engine.sync_now().await;

        let mut last_server_version = harness.get(record.id).server_version;
        for score in [81, 82, 83] {
            let before = harness.get(record.id).local_version;
            let edited = harness
                .stores
                .records
                .update_payload(&record.id, &payload(score))
                .unwrap();
            assert_eq!(edited.local_version, before + 1);
            assert_eq!(edited.sync_status, SyncStatus::Pending);

            harness.engine.sync_now().await;
            let stored = harness.get(record.id);
            assert_eq!(stored.sync_status, SyncStatus::Synced);
            assert!(stored.server_version > last_server_version);
            assert_eq!(stored.server_version, stored.local_version);
            last_server_version = stored.server_version;
        }
        assert_eq!(last_server_version, 4);
        assert_eq!(harness.server.score(record.id).unwrap().payload.score, 83);
    }

    #[tokio::test]
    async fn concurrent_triggers_run_one_round() {
        let harness = Harness::new();
        harness.record(80, 0);
        harness.server.set_delay(Duration::from_millis(50));

        let (a, b) = tokio::join!(harness.engine.sync_now(), harness.engine.sync_now());
        let skipped = [&a, &b]
            .iter()
            .filter(|outcome| matches!(outcome, RoundOutcome::Skipped))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(harness.stores.logs.recent(10).unwrap().len(), 1);
        assert_eq!(harness.server.requests().len(), 1);
        assert!(!harness.engine.is_syncing());
    }

    #[tokio::test]
    async fn offline_rounds_are_not_attempted() {
        let harness = Harness::new();
        let record = harness.record(80, 0);
        harness.connectivity.set_online(false);

        let outcome = harness.engine.sync_now().await;
        assert!(matches!(outcome, RoundOutcome::Offline { pending: 1 }));
        assert!(harness.stores.logs.recent(10).unwrap().is_empty());
        assert_eq!(harness.get(record.id).sync_attempts, 0);

        let status = harness.engine.status().unwrap();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(
            status.last_message.as_deref(),
            Some("Offline; 1 scores waiting to sync")
        );
    }

    #[tokio::test]
    async fn offline_round_survives_storage_failure() {
        let db = Database::open_in_memory().unwrap();
        let engine = SyncEngine::builder(
            SyncStores::sqlite(&db),
            FakeScoreServer::new(),
            Arc::new(StaticDeviceIdentity::new(DEVICE_ID, AccessToken::new("token"))),
        )
        .connectivity(Arc::new(ManualConnectivity::new(false)))
        .build();
        db.with_connection(|conn| Ok(conn.execute_batch("DROP TABLE score_records")?))
            .unwrap();

        let outcome = engine.sync_now().await;
        assert!(matches!(outcome, RoundOutcome::Offline { pending: 0 }));
        assert_eq!(
            engine.lock_status().last_message.as_deref(),
            Some("Offline; 0 scores waiting to sync")
        );
    }

    #[tokio::test]
    async fn auth_failure_aborts_without_touching_records() {
        let harness = Harness::with_identity(
            ConflictPolicy::ServerWins,
            50,
            5,
            StaticDeviceIdentity::new(DEVICE_ID, None),
        );
        let record = harness.record(80, 0);

        let outcome = harness.engine.sync_now().await;
        assert!(matches!(
            outcome,
            RoundOutcome::Failed {
                error: RoundError::Auth(_),
                ..
            }
        ));
        let stored = harness.get(record.id);
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.sync_attempts, 0);
        assert!(harness.server.requests().is_empty());
        assert!(!harness.stores.logs.last().unwrap().unwrap().success);
    }

    #[tokio::test]
    async fn reset_checkpoint_forces_full_round() {
        let harness = Harness::new();
        harness.record(80, 0);
        harness.engine.sync_now().await;

        // A pending score older than the checkpoint is invisible to delta rounds.
        let mut stale = GameScoreRecord::new("kid-1", "fractions", DEVICE_ID, payload(55))
            .played_at(1_000);
        stale.modified_at = 1_000;
        harness.stores.records.enqueue(&stale).unwrap();

        let delta = harness.engine.run(RoundTrigger::Scheduled).await;
        assert_eq!(report(&delta).sync_type, SyncType::Delta);
        assert_eq!(report(&delta).summary.scores_uploaded, 0);

        let reset = harness.engine.reset_checkpoint(GAME_SCORE_ENTITY).unwrap();
        assert!(reset.is_initial());

        let full = harness.engine.run(RoundTrigger::Scheduled).await;
        assert_eq!(report(&full).sync_type, SyncType::Full);
        assert_eq!(report(&full).summary.scores_uploaded, 1);
        assert_eq!(harness.get(stale.id).sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn full_rounds_continue_until_backlog_drains() {
        let harness = Harness::build(ConflictPolicy::ServerWins, 2, 5);
        let records: Vec<_> = (0..3).map(|i| harness.record(50 + i, 3_000 - i)).collect();

        let first = harness.engine.sync_now().await;
        assert_eq!(report(&first).sync_type, SyncType::Full);
        assert_eq!(report(&first).summary.scores_uploaded, 2);
        assert_eq!(harness.get(records[2].id).sync_status, SyncStatus::Pending);

        let second = harness.engine.sync_now().await;
        assert_eq!(report(&second).sync_type, SyncType::Full);
        assert_eq!(report(&second).summary.scores_uploaded, 1);
        assert_eq!(
            harness.stores.records.count_by_status(SyncStatus::Synced).unwrap(),
            3
        );
        assert!(!harness
            .stores
            .checkpoints
            .get(GAME_SCORE_ENTITY)
            .unwrap()
            .unwrap()
            .is_initial());
    }

    #[tokio::test]
    async fn missing_and_unknown_outcomes() {
        let harness = Harness::new();
        let answered = harness.record(80, 2_000);
        let ignored = harness.record(90, 1_000);
        harness.server.script(Ok(UploadResponse {
            outcomes: vec![
                RecordOutcome::accepted(answered.id, 1),
                RecordOutcome::accepted(RecordId::new(), 1),
            ],
            success_count: 2,
            message: Some("partial".to_string()),
            sequence_id: None,
        }));

        let outcome = harness.engine.sync_now().await;
        let first = report(&outcome);
        assert!(!outcome.is_failure());
        assert_eq!(first.summary.scores_uploaded, 1);
        assert_eq!(first.summary.scores_failed, 1);
        assert!(first.message.ends_with("- partial"));

        assert_eq!(harness.get(answered.id).sync_status, SyncStatus::Synced);
        let missing = harness.get(ignored.id);
        assert_eq!(missing.sync_status, SyncStatus::Pending);
        assert_eq!(missing.sync_attempts, 1);

        // Failed records are retried by the next delta round.
        let retry = harness.engine.run(RoundTrigger::Scheduled).await;
        assert_eq!(report(&retry).summary.scores_uploaded, 1);
        assert_eq!(harness.get(ignored.id).sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn unanswered_scores_escalate_like_rejections() {
        let harness = Harness::build(ConflictPolicy::ServerWins, 50, 2);
        let kept = harness.record(80, 1_000);
        let dropped = harness.record(90, 0);
        harness.server.omit(dropped.id);

        let first = harness.engine.sync_now().await;
        assert_eq!(report(&first).summary.scores_uploaded, 1);
        assert_eq!(report(&first).summary.scores_failed, 1);
        assert_eq!(harness.get(kept.id).sync_status, SyncStatus::Synced);
        let missing = harness.get(dropped.id);
        assert_eq!(missing.sync_status, SyncStatus::Pending);
        assert_eq!(missing.sync_attempts, 1);
        assert_eq!(missing.last_sync_error.as_deref(), Some(MISSING_OUTCOME));

        harness.engine.sync_now().await;
        assert_eq!(harness.get(dropped.id).sync_status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn edited_error_score_gets_fresh_attempts() {
        let harness = Harness::build(ConflictPolicy::ServerWins, 50, 3);
        let record = harness.record(500, 0);
        harness.server.reject(record.id, "score exceeds max_score");
        for _ in 0..3 {
            harness.engine.sync_now().await;
        }
        let failed = harness.get(record.id);
        assert_eq!(failed.sync_status, SyncStatus::Error);
        assert_eq!(failed.sync_attempts, 3);

        harness
            .stores
            .records
            .update_payload(&record.id, &payload(90))
            .unwrap();
        let edited = harness.get(record.id);
        assert_eq!(edited.sync_status, SyncStatus::Pending);
        assert_eq!(edited.sync_attempts, 0);

        harness.engine.sync_now().await;
        let retried = harness.get(record.id);
        assert_eq!(retried.sync_status, SyncStatus::Pending);
        assert_eq!(retried.sync_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_round_is_not_undone() {
        let harness = Harness::new();
        harness.record(80, 0);
        harness.engine.sync_now().await;
        harness.record(70, 0);
        harness.server.set_delay(Duration::from_secs(5));

        let engine = harness.engine.clone();
        let round = tokio::spawn(async move { engine.run(RoundTrigger::Scheduled).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(harness.engine.is_syncing());
        harness.engine.reset_checkpoint(GAME_SCORE_ENTITY).unwrap();

        let outcome = round.await.unwrap();
        assert_eq!(report(&outcome).sync_type, SyncType::Delta);
        assert_eq!(report(&outcome).summary.scores_uploaded, 1);
        assert!(harness
            .stores
            .checkpoints
            .get(GAME_SCORE_ENTITY)
            .unwrap()
            .unwrap()
            .is_initial());

        let next = harness.engine.run(RoundTrigger::Scheduled).await;
        assert_eq!(report(&next).sync_type, SyncType::Full);
    }

    #[tokio::test]
    async fn retried_old_score_does_not_rewind_checkpoint() {
        let harness = Harness::new();
        harness.record(80, 0);
        let mut old = GameScoreRecord::new("kid-1", "fractions", DEVICE_ID, payload(55))
            .played_at(1_000);
        old.modified_at = 1_000;
        harness.stores.records.enqueue(&old).unwrap();
        harness.server.reject(old.id, "level locked");

        harness.engine.sync_now().await;
        let before = harness
            .stores
            .checkpoints
            .get(GAME_SCORE_ENTITY)
            .unwrap()
            .unwrap();
        assert!(before.last_sync_timestamp > Some(1_000));
        assert_eq!(harness.get(old.id).sync_attempts, 1);

        // Only the retried old score is due.
        let delta = harness.engine.run(RoundTrigger::Scheduled).await;
        assert_eq!(report(&delta).sync_type, SyncType::Delta);
        assert_eq!(report(&delta).summary.scores_failed, 1);

        let after = harness
            .stores
            .checkpoints
            .get(GAME_SCORE_ENTITY)
            .unwrap()
            .unwrap();
        assert_eq!(after.last_sync_version, before.last_sync_version + 1);
        assert_eq!(after.last_sync_timestamp, before.last_sync_timestamp);
    }

    #[tokio::test]
    async fn manual_resolution_keeps_local_and_reuploads() {
        let harness = Harness::with_policy(ConflictPolicy::Manual);
        let record = harness.record(80, 0);
        harness.server.put(record.id, ServerScore::new(3, payload(20)));
        harness.engine.sync_now().await;

        let conflict = harness.stores.conflicts.list_unresolved().unwrap().remove(0);
        assert!(harness
            .engine
            .resolve_conflict(conflict.id, Resolution::KeepLocal)
            .unwrap());
        assert!(!harness
            .engine
            .resolve_conflict(conflict.id, Resolution::KeepServer)
            .unwrap());

        let stored = harness.get(record.id);
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.server_version, 3);
        assert_eq!(stored.local_version, 4);
        assert_eq!(stored.payload, payload(80));

        let resolved = harness.stores.conflicts.get(conflict.id).unwrap().unwrap();
        assert_eq!(resolved.resolution, Resolution::KeepLocal);
        assert_eq!(resolved.resolved_by, Some(ResolvedBy::User));

        harness.engine.sync_now().await;
        let synced = harness.get(record.id);
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert_eq!(synced.server_version, 4);
        assert_eq!(harness.server.score(record.id).unwrap().payload, payload(80));
    }

    #[tokio::test]
    async fn server_deletion_is_a_delete_conflict() {
        let harness = Harness::new();
        let record = harness.record(80, 0);
        harness.engine.sync_now().await;
        harness
            .stores
            .records
            .update_payload(&record.id, &payload(85))
            .unwrap();
        harness.server.remove(record.id);

        let outcome = harness.engine.sync_now().await;
        assert_eq!(report(&outcome).summary.conflicts_detected, 1);

        let conflict = harness.stores.conflicts.list_recent(1).unwrap().remove(0);
        assert_eq!(conflict.conflict_type, ConflictType::DeleteConflict);
        assert_eq!(conflict.server_value, None);
        assert_eq!(conflict.resolution, Resolution::KeepServer);

        // The row is kept and nothing is left to upload.
        let stored = harness.get(record.id);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.payload, payload(85));
        assert!(!stored.has_unsynced_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_round_is_logged_as_cancelled() {
        let harness = Harness::new();
        harness.record(80, 0);
        harness.server.set_delay(Duration::from_secs(60));

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), harness.engine.sync_now()).await;
        assert!(timed_out.is_err());

        assert!(!harness.engine.is_syncing());
        assert_eq!(harness.engine.state(), SyncState::Error);
        let log = harness.stores.logs.last().unwrap().unwrap();
        assert!(log.is_complete());
        assert!(!log.success);
        assert_eq!(log.error_message.as_deref(), Some(ROUND_CANCELLED));
    }

    #[tokio::test]
    async fn subscribers_see_state_changes() {
        let harness = Harness::new();
        let mut states = harness.engine.subscribe();
        assert_eq!(*states.borrow(), SyncState::Idle);

        harness.engine.sync_now().await;
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SyncState::Success);
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let harness = Harness::with_policy(ConflictPolicy::Manual);
        let contested = harness.record(80, 1_000);
        harness.record(90, 0);
        harness.server.put(contested.id, ServerScore::new(2, payload(10)));
        harness.engine.sync_now().await;
        harness.record(70, 0);

        let status = harness.engine.status().unwrap();
        assert_eq!(status.state, SyncState::Success);
        assert_eq!(status.pending, 1);
        assert_eq!(status.conflicts, 1);
        assert_eq!(status.errors, 0);
        assert_eq!(status.unresolved_conflicts, 1);
        assert!(status.last_round_at.is_some());
        assert_eq!(harness.engine.policy_name(), "manual");
    }

    #[test]
    fn prune_reports_removed_rows() {
        let harness = Harness::new();
        assert_eq!(harness.engine.prune(30).unwrap(), PruneReport::default());
    }

    #[test]
    fn round_message_mentions_failures_and_conflicts() {
        let summary = RoundSummary {
            scores_uploaded: 4,
            scores_failed: 1,
            conflicts_detected: 1,
            conflicts_resolved: 1,
            ..RoundSummary::default()
        };
        assert_eq!(
            round_message(&summary, None),
            "Synced 4 scores, 1 failed, 1 conflicts (1 resolved)"
        );
    }

    #[tokio::test]
    async fn expired_identity_reports_expiry() {
        let expired = chrono::Utc::now().timestamp() - 5;
        let harness = Harness::with_identity(
            ConflictPolicy::ServerWins,
            50,
            5,
            StaticDeviceIdentity::new(DEVICE_ID, AccessToken::new("token")).expires_at(expired),
        );
        harness.record(80, 0);

        let outcome = harness.engine.sync_now().await;
        assert!(matches!(
            outcome,
            RoundOutcome::Failed {
                error: RoundError::Auth(AuthError::Expired(_)),
                ..
            }
        ));
    }
}
