//! Scheduled jobs for periodic maintenance tasks.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use enrollment_common::config::ReclamationSettings;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledJob {
    /// Claim expired uploads, delete their blobs and retire the rows.
    ReclaimExpiredFiles,
    /// Hand back claims left behind by a crashed reclamation batch.
    ReleaseStaleClaims,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between reclamation batches (default: 5 minutes).
    pub reclaim_interval: Duration,
    /// Files claimed per batch.
    pub batch_size: u64,
    /// Interval between stale-claim sweeps (default: 10 minutes).
    pub stale_sweep_interval: Duration,
    /// Claims older than this are released (default: 30 minutes).
    pub stale_claim_age: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&ReclamationSettings::default())
    }
}

impl From<&ReclamationSettings> for SchedulerConfig {
    fn from(settings: &ReclamationSettings) -> Self {
        Self {
            reclaim_interval: Duration::from_secs(settings.interval_secs.max(1)),
            batch_size: settings.batch_size.max(1),
            stale_sweep_interval: Duration::from_secs(settings.stale_sweep_interval_secs.max(1)),
            stale_claim_age: Duration::from_secs(settings.stale_claim_age_secs),
        }
    }
}

/// Scheduler state for tracking job runs.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub last_reclaim: Option<DateTime<Utc>>,
    pub last_stale_release: Option<DateTime<Utc>>,
    pub files_deleted: u64,
    pub delete_failures: u64,
    pub claims_released: u64,
    pub last_error: Option<(ScheduledJob, String)>,
}

/// Outcome of one reclamation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimSummary {
    pub claimed: u64,
    pub deleted: u64,
    pub failed: u64,
}

pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait ReclamationExecutor: Send + Sync {
    /// Reclaim one batch of expired uploads.
    async fn reclaim_expired_files(&self, batch_size: u64) -> Result<ReclaimSummary, JobError>;

    /// Release claims older than `max_age`.
    async fn release_stale_claims(&self, max_age: Duration) -> Result<u64, JobError>;
}

/// Running scheduler tasks and their shared state.
pub struct SchedulerHandle {
    pub state: Arc<RwLock<SchedulerState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Snapshot of the current state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }

    /// Stop all scheduled tasks. A batch in flight is cancelled; its claims
    /// are picked up again by a later stale-claim sweep.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Run the scheduler with the given configuration and executor.
pub fn run_scheduler<E: ReclamationExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
) -> SchedulerHandle {
    let state = Arc::new(RwLock::new(SchedulerState::default()));

    let executor_reclaim = executor.clone();
    let executor_release = executor;
    let state_reclaim = state.clone();
    let state_release = state.clone();

    let reclaim_interval = config.reclaim_interval;
    let batch_size = config.batch_size;
    let stale_sweep_interval = config.stale_sweep_interval;
    let stale_claim_age = config.stale_claim_age;

    // Spawn reclamation task
    let reclaim = tokio::spawn(async move {
        let mut interval = interval(reclaim_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let result = executor_reclaim.reclaim_expired_files(batch_size).await;
            let mut state = state_reclaim.write().await;
            state.last_reclaim = Some(Utc::now());
            match result {
                Ok(summary) => {
                    state.files_deleted += summary.deleted;
                    state.delete_failures += summary.failed;
                    if summary.claimed > 0 {
                        tracing::info!(
                            claimed = summary.claimed,
                            deleted = summary.deleted,
                            failed = summary.failed,
                            "Reclamation batch finished"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reclaim expired files");
                    state.last_error = Some((ScheduledJob::ReclaimExpiredFiles, e.to_string()));
                }
            }
        }
    });

    // Spawn stale claim release task
    let release = tokio::spawn(async move {
        let mut interval = interval(stale_sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let result = executor_release.release_stale_claims(stale_claim_age).await;
            let mut state = state_release.write().await;
            state.last_stale_release = Some(Utc::now());
            match result {
                Ok(count) => {
                    state.claims_released += count;
                    if count > 0 {
                        tracing::info!(count, "Released stale claims");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to release stale claims");
                    state.last_error = Some((ScheduledJob::ReleaseStaleClaims, e.to_string()));
                }
            }
        }
    });

    SchedulerHandle {
        state,
        tasks: vec![reclaim, release],
    }
}
