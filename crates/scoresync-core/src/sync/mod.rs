//! Upload of queued scores to the score API.
//!
//! [`SyncEngine`] runs rounds; [`SyncScheduler`] decides when. The transport,
//! identity and conflict policy are ports so hosts and tests can swap them.

mod engine;
mod http;
mod identity;
mod policy;
pub mod resolver;
mod scheduler;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{
    EngineStatus, PruneReport, RoundError, RoundOutcome, RoundReport, RoundTrigger, SyncEngine,
    SyncEngineBuilder, SyncStores,
};
pub use http::HttpScoreTransport;
pub use identity::{
    AccessToken, AlwaysOnline, AuthError, Connectivity, DeviceIdentity, ManualConnectivity,
    StaticDeviceIdentity,
};
pub use policy::{ConflictPolicy, ResolutionPolicy};
pub use scheduler::{next_delay, ScheduleConfig, SchedulerHandle, SyncScheduler};
pub use transport::{
    OutcomeKind, RecordOutcome, ScoreTransport, ScoreUpload, ServerScore, TransportError,
    UploadBatch, UploadResponse,
};
