//! Periodic and on-demand sync rounds on a background task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;

use super::engine::{RoundOutcome, RoundTrigger, SyncEngine};

const MAX_BACKOFF_DOUBLINGS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Delay before the first round after startup
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Upper bound for the interval after consecutive failed rounds
    pub max_backoff: Duration,
    /// How long shutdown waits for an in-flight round
    pub shutdown_grace: Duration,
}

impl ScheduleConfig {
    pub const fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            initial_delay: settings.initial_delay(),
            interval: settings.sync_interval(),
            max_backoff: settings.max_backoff(),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

/// Delay until the next scheduled round.
///
/// Doubles the interval per consecutive failure, capped at `max_backoff`
/// (but never below `interval`).
pub fn next_delay(interval: Duration, max_backoff: Duration, failures: u32) -> Duration {
    let factor = 1_u32 << failures.min(MAX_BACKOFF_DOUBLINGS);
    interval
        .saturating_mul(factor)
        .min(max_backoff.max(interval))
}

pub struct SyncScheduler;

impl SyncScheduler {
    /// Start the scheduling loop on the current tokio runtime
    pub fn spawn(engine: Arc<SyncEngine>, config: ScheduleConfig) -> SchedulerHandle {
        let (requests_tx, requests_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_loop(engine, config, requests_rx, shutdown.clone()));

        SchedulerHandle {
            requests: requests_tx,
            shutdown,
            task,
        }
    }
}

pub struct SchedulerHandle {
    requests: mpsc::Sender<()>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for a round now. Returns `false` if one is already queued or the
    /// scheduler has stopped.
    pub fn sync_now(&self) -> bool {
        self.requests.try_send(()).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop, giving an in-flight round the configured grace period
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            tracing::error!("Sync scheduler task failed: {error}");
        }
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    config: ScheduleConfig,
    mut requests: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    tracing::info!(
        "Sync scheduler started (every {}s, first round in {}s)",
        config.interval.as_secs(),
        config.initial_delay.as_secs()
    );

    let mut failures = 0_u32;
    let mut next_tick = Instant::now() + config.initial_delay;

    loop {
        let trigger = tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep_until(next_tick) => RoundTrigger::Scheduled,
            Some(()) = requests.recv() => RoundTrigger::Manual,
        };

        let round = engine.run(trigger);
        tokio::pin!(round);
        let outcome = loop {
            tokio::select! {
                outcome = &mut round => break Some(outcome),
                () = shutdown.cancelled() => {
                    break match tokio::time::timeout(config.shutdown_grace, &mut round).await {
                        Ok(outcome) => Some(outcome),
                        Err(_) => {
                            tracing::warn!(
                                "Sync round still running after {}ms; cancelling it",
                                config.shutdown_grace.as_millis()
                            );
                            None
                        }
                    };
                }
                Some(()) = requests.recv() => {
                    tracing::debug!("Sync requested while a round is running; ignoring");
                }
            }
        };

        match &outcome {
            Some(RoundOutcome::Failed { .. }) => failures = failures.saturating_add(1),
            Some(RoundOutcome::Completed(_)) => failures = 0,
            Some(RoundOutcome::Skipped | RoundOutcome::Offline { .. }) | None => {}
        }
        if outcome.is_none() || shutdown.is_cancelled() {
            break;
        }

        let delay = next_delay(config.interval, config.max_backoff, failures);
        if failures > 0 {
            tracing::info!(
                "Sync failed {failures} time(s) in a row; next round in {}s",
                delay.as_secs()
            );
        }
        next_tick = Instant::now() + delay;
    }

    tracing::info!("Sync scheduler stopped");
}
