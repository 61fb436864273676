//! In-memory score server and engine harness for tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::db::Database;
use crate::models::{GameScoreRecord, RecordId, ScorePayload};

use super::engine::{SyncEngine, SyncStores};
use super::identity::{AccessToken, ManualConnectivity, StaticDeviceIdentity};
use super::policy::ConflictPolicy;
use super::transport::{
    OutcomeKind, RecordOutcome, ScoreTransport, ScoreUpload, ServerScore, TransportError,
    UploadBatch, UploadResponse,
};

pub const DEVICE_ID: &str = "tablet-7";

#[derive(Default)]
struct ServerState {
    scores: HashMap<RecordId, ServerScore>,
    rejections: HashMap<RecordId, String>,
    silent: HashSet<RecordId>,
    scripted: VecDeque<Result<UploadResponse, TransportError>>,
    unreachable: bool,
    lose_next_response: bool,
    delay: Option<Duration>,
    requests: Vec<UploadBatch>,
    writes: usize,
    sequence: u64,
}

impl ServerState {
    fn apply(&mut self, upload: &ScoreUpload) -> Option<RecordOutcome> {
        if let Some(reason) = self.rejections.get(&upload.id) {
            return Some(RecordOutcome::rejected(upload.id, reason.clone()));
        }
        if self.silent.contains(&upload.id) {
            return None;
        }

        let outcome = match self.scores.get(&upload.id).cloned() {
            None if upload.base_version == 0 => self.store(upload),
            None => RecordOutcome::conflict(upload.id, None),
            Some(existing)
                if existing.version == upload.local_version
                    && existing.content_hash == upload.content_hash =>
            {
                RecordOutcome::accepted(upload.id, existing.version)
            }
            Some(existing) if existing.version == upload.base_version => self.store(upload),
            Some(existing) => RecordOutcome::conflict(upload.id, Some(existing)),
        };
        Some(outcome)
    }

    fn store(&mut self, upload: &ScoreUpload) -> RecordOutcome {
        self.scores.insert(
            upload.id,
            ServerScore {
                version: upload.local_version,
                content_hash: upload.content_hash.clone(),
                payload: upload.payload.clone(),
                modified_at: Some(chrono::Utc::now().timestamp_millis()),
            },
        );
        self.writes += 1;
        RecordOutcome::accepted(upload.id, upload.local_version)
    }
}

/// Score authority that accepts fast-forwards, spots duplicates by
/// `id` + version and reports everything else as a conflict.
#[derive(Default)]
pub struct FakeScoreServer {
    state: Mutex<ServerState>,
}

impl FakeScoreServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Apply the next upload, then fail as if the response was lost
    pub fn lose_next_response(&self) {
        self.lock().lose_next_response = true;
    }

    pub fn reject(&self, id: RecordId, reason: &str) {
        self.lock().rejections.insert(id, reason.to_string());
    }

    /// Leave `id` out of every response
    pub fn omit(&self, id: RecordId) {
        self.lock().silent.insert(id);
    }

    /// Answer the next upload with `response` instead of processing it
    pub fn script(&self, response: Result<UploadResponse, TransportError>) {
        self.lock().scripted.push_back(response);
    }

    /// Server-side write, as if another device or an admin changed the score
    pub fn put(&self, id: RecordId, score: ServerScore) {
        self.lock().scores.insert(id, score);
    }

    pub fn remove(&self, id: RecordId) {
        self.lock().scores.remove(&id);
    }

    pub fn score(&self, id: RecordId) -> Option<ServerScore> {
        self.lock().scores.get(&id).cloned()
    }

    /// Number of uploads that changed server state
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn requests(&self) -> Vec<UploadBatch> {
        self.lock().requests.clone()
    }
}

#[async_trait]
impl ScoreTransport for FakeScoreServer {
    async fn upload_scores(
        &self,
        _token: &AccessToken,
        batch: &UploadBatch,
    ) -> Result<UploadResponse, TransportError> {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.requests.push(batch.clone());
        if let Some(scripted) = state.scripted.pop_front() {
            return scripted;
        }
        if state.unreachable {
            return Err(TransportError::Unreachable("connection refused".to_string()));
        }

        let outcomes: Vec<_> = batch
            .scores
            .iter()
            .filter_map(|upload| state.apply(upload))
            .collect();
        if std::mem::take(&mut state.lose_next_response) {
            return Err(TransportError::Unreachable("connection reset".to_string()));
        }

        state.sequence += 1;
        let success_count = outcomes
            .iter()
            .filter(|outcome| matches!(outcome.kind, OutcomeKind::Accepted { .. }))
            .count();
        Ok(UploadResponse {
            success_count: u32::try_from(success_count).unwrap_or(u32::MAX),
            outcomes,
            message: None,
            sequence_id: Some(format!("seq-{}", state.sequence)),
        })
    }
}

pub fn payload(score: i64) -> ScorePayload {
    ScorePayload {
        score,
        max_score: 100,
        correct_answers: 8,
        total_questions: 10,
        duration_ms: 45_000,
        level: Some(2),
        metadata: BTreeMap::new(),
    }
}

/// Engine wired to an in-memory database and a [`FakeScoreServer`]
pub struct Harness {
    pub stores: SyncStores,
    pub server: Arc<FakeScoreServer>,
    pub connectivity: Arc<ManualConnectivity>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ConflictPolicy::ServerWins, 50, 5)
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self::build(policy, 50, 5)
    }

    pub fn build(policy: ConflictPolicy, batch_size: usize, max_attempts: u32) -> Self {
        Self::with_identity(
            policy,
            batch_size,
            max_attempts,
            StaticDeviceIdentity::new(DEVICE_ID, AccessToken::new("device-token")),
        )
    }

    pub fn with_identity(
        policy: ConflictPolicy,
        batch_size: usize,
        max_attempts: u32,
        identity: StaticDeviceIdentity,
    ) -> Self {
        let db = Database::open_in_memory().unwrap();
        let stores = SyncStores::sqlite(&db);
        let server = FakeScoreServer::new();
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let engine = SyncEngine::builder(stores.clone(), server.clone(), Arc::new(identity))
            .connectivity(connectivity.clone())
            .policy(Arc::new(policy))
            .batch_size(batch_size)
            .max_attempts(max_attempts)
            .build();

        Self {
            stores,
            server,
            connectivity,
            engine: Arc::new(engine),
        }
    }

    /// Queue a new score played `age_ms` ago
    pub fn record(&self, score: i64, age_ms: i64) -> GameScoreRecord {
        let now = chrono::Utc::now().timestamp_millis();
        let record = GameScoreRecord::new("kid-1", "fractions", DEVICE_ID, payload(score))
            .played_at(now - age_ms);
        self.stores.records.enqueue(&record).unwrap();
        record
    }

    pub fn get(&self, id: RecordId) -> GameScoreRecord {
        self.stores.records.get(&id).unwrap().unwrap()
    }
}
