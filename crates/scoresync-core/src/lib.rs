//! scoresync-core - Core library for scoresync
//!
//! This crate contains the score queue, the checkpoint/conflict/log stores,
//! and the sync engine that uploads queued game scores to the score API.
//! Hosts (the CLI, game clients) provide a device identity and wire an
//! engine with [`sync::SyncEngine::builder`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{GameScoreRecord, RecordId, ScorePayload, SyncStatus};
