//! Scheduler integration tests.
//!
//! These run the real interval loops against a scripted executor with tokio's
//! paused clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use enrollment_queue::{
    JobError, ReclaimSummary, ReclamationExecutor, ScheduledJob, SchedulerConfig, run_scheduler,
};

#[derive(Default)]
struct ScriptedExecutor {
    reclaim_calls: AtomicU64,
    release_calls: AtomicU64,
    fail_release: bool,
}

#[async_trait::async_trait]
impl ReclamationExecutor for ScriptedExecutor {
    async fn reclaim_expired_files(&self, batch_size: u64) -> Result<ReclaimSummary, JobError> {
        self.reclaim_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ReclaimSummary {
            claimed: batch_size,
            deleted: batch_size - 1,
            failed: 1,
        })
    }

    async fn release_stale_claims(&self, _max_age: Duration) -> Result<u64, JobError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err("database unavailable".into());
        }
        Ok(2)
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        reclaim_interval: Duration::from_secs(60),
        batch_size: 5,
        stale_sweep_interval: Duration::from_secs(120),
        stale_claim_age: Duration::from_secs(600),
    }
}

#[tokio::test(start_paused = true)]
async fn test_jobs_run_on_their_intervals() {
    let executor = Arc::new(ScriptedExecutor::default());
    let handle = run_scheduler(config(), executor.clone());

    // Ticks at 0, 60, 120, 180 and 0, 120.
    tokio::time::sleep(Duration::from_secs(200)).await;

    assert_eq!(executor.reclaim_calls.load(Ordering::SeqCst), 4);
    assert_eq!(executor.release_calls.load(Ordering::SeqCst), 2);

    let state = handle.state().await;
    assert_eq!(state.files_deleted, 16);
    assert_eq!(state.delete_failures, 4);
    assert_eq!(state.claims_released, 4);
    assert!(state.last_reclaim.is_some());
    assert!(state.last_error.is_none());

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_keeps_running() {
    let executor = Arc::new(ScriptedExecutor {
        fail_release: true,
        ..Default::default()
    });
    let handle = run_scheduler(config(), executor.clone());

    tokio::time::sleep(Duration::from_secs(250)).await;

    assert_eq!(executor.release_calls.load(Ordering::SeqCst), 3);
    let state = handle.state().await;
    assert_eq!(state.claims_released, 0);
    assert!(matches!(
        state.last_error,
        Some((ScheduledJob::ReleaseStaleClaims, _))
    ));

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_jobs() {
    let executor = Arc::new(ScriptedExecutor::default());
    let handle = run_scheduler(config(), executor.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown();
    let after_shutdown = executor.reclaim_calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(executor.reclaim_calls.load(Ordering::SeqCst), after_shutdown);
}
