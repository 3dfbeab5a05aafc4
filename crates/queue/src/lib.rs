//! Background maintenance for the enrollment engine.
//!
//! - **Scheduler**: periodic reclamation of expired uploads and release of
//!   abandoned reclamation claims
//! - **Executor**: the [`ReclamationExecutor`] implementation backed by
//!   [`enrollment_core::FileLifecycleService`]

pub mod executor;
pub mod scheduler;

pub use scheduler::{
    JobError, ReclaimSummary, ReclamationExecutor, ScheduledJob, SchedulerConfig, SchedulerHandle,
    SchedulerState, run_scheduler,
};
