//! Uploaded document lifecycle.
//!
//! Uploads start temporary and expire after the configured TTL. A child
//! record that references a file promotes it to permanent inside the same
//! transaction as the child write. Expired files are reclaimed by a periodic
//! worker: claim a batch, delete each blob, then soft-delete the row or count
//! the failure and release the claim.

use std::sync::LazyLock;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use enrollment_common::{
    AppError, AppResult, IdGenerator, SharedStorage, TenantScope, config::FileSettings, object_key,
};
use enrollment_db::{
    entities::{RecordState, file},
    repositories::{FileRepository, ParticipantRepository},
};
use regex::Regex;
use sea_orm::{ConnectionTrait, Set};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::transaction::TransactionManager;

#[allow(clippy::unwrap_used)]
static FIELD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").unwrap());

/// A document to upload.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub participant_id: String,
    /// Logical placement, e.g. `identity_card`.
    pub field_name: String,
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Outcome of one reclamation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub claimed: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// File lifecycle service.
#[derive(Clone)]
pub struct FileLifecycleService {
    tx: TransactionManager,
    files: FileRepository,
    participants: ParticipantRepository,
    storage: SharedStorage,
    bucket: String,
    settings: FileSettings,
    id_gen: IdGenerator,
}

impl FileLifecycleService {
    #[must_use]
    pub fn new(
        tx: TransactionManager,
        storage: SharedStorage,
        bucket: impl Into<String>,
        settings: FileSettings,
    ) -> Self {
        Self {
            tx,
            files: FileRepository::new(),
            participants: ParticipantRepository::new(),
            storage,
            bucket: bucket.into(),
            settings,
            id_gen: IdGenerator::new(),
        }
    }

    /// Upload a document as a temporary file.
    ///
    /// The blob is written first. If the metadata row cannot be stored
    /// afterwards, the blob is deleted again before the error is returned.
    pub async fn upload(
        &self,
        scope: &TenantScope,
        uploader_id: &str,
        input: UploadInput,
    ) -> AppResult<file::Model> {
        self.check_upload(&input)?;

        let conn = self.tx.connection();
        self.participants
            .get(conn, scope, &input.participant_id)
            .await?;

        let key = object_key(
            scope,
            &input.participant_id,
            &input.field_name,
            &self.id_gen.generate_object_name(),
            &input.original_name,
        );
        let stored = self
            .storage
            .upload(&self.bucket, &key, input.data, &input.content_type)
            .await?;

        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.settings.temporary_ttl_secs as i64);
        let model = file::ActiveModel {
            id: Set(self.id_gen.generate()),
            tenant_id: Set(scope.tenant_id.clone()),
            product_id: Set(scope.product_id.clone()),
            participant_id: Set(input.participant_id),
            field_name: Set(input.field_name),
            uploaded_by: Set(uploader_id.to_string()),
            bucket: Set(self.bucket.clone()),
            storage_key: Set(stored.key.clone()),
            original_name: Set(input.original_name),
            content_type: Set(input.content_type),
            size: Set(stored.size as i64),
            md5: Set(Some(stored.md5)),
            expires_at: Set(Some(expires_at.into())),
            claimed_at: Set(None),
            failed_delete_attempts: Set(0),
            record_state: Set(RecordState::Active),
            created_at: Set(now.into()),
            deleted_at: Set(None),
        };

        match self.files.insert(conn, model).await {
            Ok(file) => {
                debug!(file_id = %file.id, participant_id = %file.participant_id, "File uploaded");
                Ok(file)
            }
            Err(error) => {
                if let Err(cleanup) = self.storage.delete(&self.bucket, &stored.key).await {
                    warn!(key = %stored.key, error = %cleanup, "Failed to delete orphaned blob");
                }
                Err(error)
            }
        }
    }

    fn check_upload(&self, input: &UploadInput) -> AppResult<()> {
        if input.data.is_empty() {
            return Err(AppError::field("file", "empty", "File is empty"));
        }
        if input.data.len() as u64 > self.settings.max_upload_bytes {
            return Err(AppError::field(
                "file",
                "too_large",
                format!(
                    "File too large. Maximum size is {} bytes",
                    self.settings.max_upload_bytes
                ),
            ));
        }
        if !self.settings.accepts(&input.content_type) {
            return Err(AppError::field(
                "content_type",
                "unsupported",
                format!("Content type {} is not accepted", input.content_type),
            ));
        }
        if !FIELD_NAME_RE.is_match(&input.field_name) {
            return Err(AppError::field(
                "field_name",
                "invalid",
                "Field name must be lowercase letters, digits or underscores",
            ));
        }
        Ok(())
    }

    /// Get a live file.
    pub async fn get(&self, scope: &TenantScope, id: &str) -> AppResult<file::Model> {
        self.files
            .find_live(self.tx.connection(), scope, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {id}")))
    }

    /// Promote a file to permanent inside the caller's transaction.
    ///
    /// The file must lie in `scope` and belong to `participant_id`. A file
    /// that is already permanent is returned unchanged.
    pub async fn promote_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        file_id: &str,
    ) -> AppResult<file::Model> {
        let file = self
            .files
            .find_by_id(conn, file_id)
            .await?
            .filter(|f| f.record_state.is_active())
            .ok_or_else(|| AppError::NotFound(format!("File {file_id}")))?;

        if !scope.contains(&file.tenant_id, &file.product_id) || file.participant_id != participant_id
        {
            return Err(AppError::Forbidden(format!(
                "File {file_id} does not belong to participant {participant_id}"
            )));
        }

        if file.is_permanent() {
            return Ok(file);
        }

        self.files
            .promote(conn, file_id, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::Unprocessable(format!(
                    "File {file_id} has expired or is being reclaimed; upload it again"
                ))
            })
    }

    /// Claim up to `limit` files that expired at or before `now`.
    pub async fn claim_expired(&self, now: DateTime<Utc>, limit: u64) -> AppResult<Vec<file::Model>> {
        self.files
            .claim_expired(self.tx.connection(), now, limit)
            .await
    }

    /// Reclaim one batch of expired files.
    pub async fn reclaim_batch(&self, limit: u64) -> AppResult<ReclaimReport> {
        self.reclaim_batch_at(Utc::now(), limit).await
    }

    /// Reclaim one batch of files expired as of `now`.
    pub async fn reclaim_batch_at(&self, now: DateTime<Utc>, limit: u64) -> AppResult<ReclaimReport> {
        let conn = self.tx.connection();
        let claimed = self.claim_expired(now, limit).await?;
        let mut report = ReclaimReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        for file in claimed {
            match self.storage.delete(&file.bucket, &file.storage_key).await {
                Ok(()) => {
                    // A failure here leaves the row claimed; the stale-claim
                    // sweep hands it back and the next delete is a no-op.
                    match self.files.mark_deleted(conn, &file.id).await {
                        Ok(_) => report.deleted += 1,
                        Err(error) => {
                            warn!(file_id = %file.id, error = %error, "Failed to mark file deleted");
                            report.failed += 1;
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        file_id = %file.id,
                        attempts = file.failed_delete_attempts + 1,
                        error = %error,
                        "Failed to delete blob"
                    );
                    // The claim stays until the stale-claim sweep if this
                    // write fails too.
                    if let Err(error) = self.files.record_failed_delete(conn, &file.id).await {
                        warn!(file_id = %file.id, error = %error, "Failed to record failed delete");
                    }
                    report.failed += 1;
                }
            }
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                deleted = report.deleted,
                failed = report.failed,
                "Reclaimed expired files"
            );
        }

        Ok(report)
    }

    /// Release claims older than `max_age`.
    pub async fn release_stale_claims(&self, max_age: Duration) -> AppResult<u64> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| AppError::Internal(format!("Invalid claim age: {e}")))?;
        let released = self
            .files
            .release_stale_claims(self.tx.connection(), Utc::now() - max_age)
            .await?;

        if released > 0 {
            info!(count = released, "Released stale file claims");
        }
        Ok(released)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MemoryStorage;
    use enrollment_db::{
        entities::participant::{self, ParticipantStatus},
        test_utils::fixtures,
    };
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn service(db: DatabaseConnection, storage: Arc<MemoryStorage>) -> FileLifecycleService {
        FileLifecycleService::new(
            TransactionManager::new(Arc::new(db)),
            storage,
            "enrollment-documents",
            FileSettings::default(),
        )
    }

    fn upload_input() -> UploadInput {
        UploadInput {
            participant_id: "p1".to_string(),
            field_name: "identity_card".to_string(),
            original_name: "ktp.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: Bytes::from_static(b"%PDF-1.7"),
        }
    }

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_upload_stores_temporary_file() {
        let stored = fixtures::file("f1", "p1");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::participant("p1", ParticipantStatus::Draft)]])
            .append_query_results([[stored.clone()]])
            .into_connection();
        let storage = MemoryStorage::shared();

        let file = service(db, storage.clone())
            .upload(&fixtures::scope(), "u1", upload_input())
            .await
            .unwrap();

        assert_eq!(file, stored);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_deletes_blob_when_metadata_fails() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::participant("p1", ParticipantStatus::Draft)]])
            .append_query_errors([sea_orm::DbErr::Custom("disk full".to_string())])
            .into_connection();
        let storage = MemoryStorage::shared();

        let result = service(db, storage.clone())
            .upload(&fixtures::scope(), "u1", upload_input())
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_type_before_storage() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let storage = MemoryStorage::shared();

        let mut input = upload_input();
        input.content_type = "application/x-msdownload".to_string();
        let result = service(db, storage.clone())
            .upload(&fixtures::scope(), "u1", input)
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn test_upload_unknown_participant_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<participant::Model>::new()])
            .into_connection();
        let storage = MemoryStorage::shared();

        let result = service(db, storage.clone())
            .upload(&fixtures::scope(), "u1", upload_input())
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn test_promote_other_participant_is_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::file("f1", "p2")]])
            .into_connection();
        let svc = service(db, MemoryStorage::shared());

        let result = svc
            .promote_in(svc.tx.connection(), &fixtures::scope(), "p1", "f1")
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_promote_claimed_file_is_unprocessable() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::file("f1", "p1")]])
            .append_query_results([Vec::<file::Model>::new()])
            .into_connection();
        let svc = service(db, MemoryStorage::shared());

        let result = svc
            .promote_in(svc.tx.connection(), &fixtures::scope(), "p1", "f1")
            .await;
        assert!(matches!(result, Err(AppError::Unprocessable(_))));
    }

    #[tokio::test]
    async fn test_promote_clears_expiry() {
        let mut promoted = fixtures::file("f1", "p1");
        promoted.expires_at = None;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::file("f1", "p1")]])
            .append_query_results([[promoted]])
            .into_connection();
        let svc = service(db, MemoryStorage::shared());

        let file = svc
            .promote_in(svc.tx.connection(), &fixtures::scope(), "p1", "f1")
            .await
            .unwrap();
        assert!(file.is_permanent());
    }

    #[tokio::test]
    async fn test_unreferenced_upload_is_reclaimed_after_expiry() {
        let scope = fixtures::scope();
        let storage = MemoryStorage::shared();

        // Upload writes the blob.
        let uploaded = fixtures::file("f1", "p1");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::participant("p1", ParticipantStatus::Draft)]])
            .append_query_results([[uploaded.clone()]])
            .into_connection();
        service(db, storage.clone())
            .upload(&scope, "u1", upload_input())
            .await
            .unwrap();
        let key = storage
            .objects
            .lock()
            .unwrap()
            .keys()
            .next()
            .unwrap()
            .1
            .clone();

        // A day later the worker claims it.
        let mut claimed = uploaded;
        claimed.storage_key = key.clone();
        claimed.claimed_at = Some(Utc::now().into());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[claimed]])
            .append_exec_results([exec(1)])
            .append_query_results([Vec::<file::Model>::new()])
            .into_connection();
        let svc = service(db, storage.clone());

        let report = svc
            .reclaim_batch_at(Utc::now() + chrono::Duration::hours(25), 10)
            .await
            .unwrap();
        assert_eq!(
            report,
            ReclaimReport {
                claimed: 1,
                deleted: 1,
                failed: 0
            }
        );
        assert!(!storage.contains("enrollment-documents", &key));

        let result = svc.get(&scope, "f1").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_blob_delete_is_counted() {
        let mut claimed = fixtures::file("f1", "p1");
        claimed.claimed_at = Some(Utc::now().into());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[claimed]])
            .append_exec_results([exec(1)])
            .into_connection();

        let report = service(db, MemoryStorage::failing_deletes())
            .reclaim_batch(10)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_mixed_batch_counts_each_outcome() {
        let mut good = fixtures::file("f1", "p1");
        good.claimed_at = Some(Utc::now().into());
        let mut stuck = fixtures::file("f2", "p1");
        stuck.claimed_at = Some(Utc::now().into());

        let storage = MemoryStorage::failing_deletes_for(&[stuck.storage_key.as_str()]);
        storage.put("enrollment-documents", &good.storage_key);
        storage.put("enrollment-documents", &stuck.storage_key);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[good.clone(), stuck.clone()]])
            .append_exec_results([exec(1), exec(1)])
            .into_connection();

        let report = service(db, storage.clone())
            .reclaim_batch(10)
            .await
            .unwrap();

        assert_eq!(
            report,
            ReclaimReport {
                claimed: 2,
                deleted: 1,
                failed: 1
            }
        );
        assert!(!storage.contains("enrollment-documents", &good.storage_key));
        assert!(storage.contains("enrollment-documents", &stuck.storage_key));
    }

    #[tokio::test]
    async fn test_bookkeeping_error_does_not_abort_batch() {
        let mut first = fixtures::file("f1", "p1");
        first.claimed_at = Some(Utc::now().into());
        let mut second = fixtures::file("f2", "p1");
        second.claimed_at = Some(Utc::now().into());

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[first, second]])
                .append_exec_errors([sea_orm::DbErr::Custom("deadlock".to_string())])
                .append_exec_results([exec(1)])
                .into_connection(),
        );
        let svc = FileLifecycleService::new(
            TransactionManager::new(db.clone()),
            MemoryStorage::failing_deletes(),
            "enrollment-documents",
            FileSettings::default(),
        );

        let report = svc.reclaim_batch(10).await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.failed, 2);

        drop(svc);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        // One claim plus one failure update per file.
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn test_file_is_parked_after_repeated_delete_failures() {
        let storage = MemoryStorage::failing_deletes();
        let mut db = MockDatabase::new(DatabaseBackend::Postgres);
        for attempts in 0..file::MAX_DELETE_ATTEMPTS {
            let mut claimed = fixtures::file("f1", "p1");
            claimed.claimed_at = Some(Utc::now().into());
            claimed.failed_delete_attempts = attempts;
            db = db
                .append_query_results([[claimed]])
                .append_exec_results([exec(1)]);
        }
        // With the counter at the ceiling the claim no longer selects the row.
        let db = Arc::new(
            db.append_query_results([Vec::<file::Model>::new()])
                .into_connection(),
        );
        let svc = FileLifecycleService::new(
            TransactionManager::new(db.clone()),
            storage,
            "enrollment-documents",
            FileSettings::default(),
        );

        for _ in 0..file::MAX_DELETE_ATTEMPTS {
            let report = svc.reclaim_batch(10).await.unwrap();
            assert_eq!(report.failed, 1);
        }
        let report = svc.reclaim_batch(10).await.unwrap();
        assert_eq!(report, ReclaimReport::default());

        drop(svc);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        let statements: Vec<_> = log.iter().flat_map(|t| t.statements()).collect();
        let failures = statements
            .iter()
            .filter(|stmt| stmt.sql.contains("\"failed_delete_attempts\" + "))
            .count();
        assert_eq!(failures, file::MAX_DELETE_ATTEMPTS as usize);
        let claims: Vec<_> = statements
            .iter()
            .filter(|stmt| stmt.sql.contains("SKIP LOCKED"))
            .collect();
        assert_eq!(claims.len(), file::MAX_DELETE_ATTEMPTS as usize + 1);
        assert!(claims.iter().all(|stmt| stmt
            .values
            .as_ref()
            .is_some_and(|values| values.0.contains(&file::MAX_DELETE_ATTEMPTS.into()))));
    }

    #[tokio::test]
    async fn test_upload_storage_failure_stores_no_metadata() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::participant("p1", ParticipantStatus::Draft)]])
            .into_connection();
        let storage = MemoryStorage::failing_uploads();

        let result = service(db, storage.clone())
            .upload(&fixtures::scope(), "u1", upload_input())
            .await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(2)])
            .into_connection();

        let released = service(db, MemoryStorage::shared())
            .release_stale_claims(Duration::from_secs(1800))
            .await
            .unwrap();
        assert_eq!(released, 2);
    }
}
