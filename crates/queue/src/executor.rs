//! Reclamation backed by the file lifecycle service.

use std::time::Duration;

use enrollment_core::{FileLifecycleService, ReclaimReport};

use crate::scheduler::{JobError, ReclaimSummary, ReclamationExecutor};

impl From<ReclaimReport> for ReclaimSummary {
    fn from(report: ReclaimReport) -> Self {
        Self {
            claimed: report.claimed as u64,
            deleted: report.deleted as u64,
            failed: report.failed as u64,
        }
    }
}

#[async_trait::async_trait]
impl ReclamationExecutor for FileLifecycleService {
    async fn reclaim_expired_files(&self, batch_size: u64) -> Result<ReclaimSummary, JobError> {
        Ok(self.reclaim_batch(batch_size).await?.into())
    }

    async fn release_stale_claims(&self, max_age: Duration) -> Result<u64, JobError> {
        Ok(FileLifecycleService::release_stale_claims(self, max_age).await?)
    }
}
