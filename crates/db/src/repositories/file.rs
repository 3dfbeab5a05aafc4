//! Uploaded file repository, including the reclamation claim protocol.

use chrono::{DateTime, Utc};
use enrollment_common::{AppError, AppResult, TenantScope};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, DatabaseBackend, EntityTrait,
    QueryFilter, Statement, prelude::DateTimeWithTimeZone, sea_query::Expr,
};

use super::versioned::insert_error;
use crate::entities::{File, RecordState, file};

/// Claims up to `$2` reclaimable rows in one statement. `SKIP LOCKED` keeps
/// concurrent workers from blocking on, or double-claiming, the same rows.
const CLAIM_EXPIRED_SQL: &str = r#"
UPDATE "file" SET "claimed_at" = $1
WHERE "id" IN (
    SELECT "id" FROM "file"
    WHERE "expires_at" <= $1
      AND "claimed_at" IS NULL
      AND "failed_delete_attempts" < $3
      AND "record_state" = 'active'
    ORDER BY "expires_at"
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
RETURNING *
"#;

/// File repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRepository;

impl FileRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Find a live file by ID inside a scope.
    pub async fn find_live<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
    ) -> AppResult<Option<file::Model>> {
        File::find_by_id(id)
            .filter(file::Column::TenantId.eq(scope.tenant_id.as_str()))
            .filter(file::Column::ProductId.eq(scope.product_id.as_str()))
            .filter(file::Column::RecordState.eq(RecordState::Active))
            .one(conn)
            .await
            .map_err(AppError::db("find file"))
    }

    /// Find a file by ID regardless of scope or state.
    pub async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<file::Model>> {
        File::find_by_id(id)
            .one(conn)
            .await
            .map_err(AppError::db("find file by id"))
    }

    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: file::ActiveModel,
    ) -> AppResult<file::Model> {
        File::insert(model)
            .exec_with_returning(conn)
            .await
            .map_err(insert_error("File", "insert file"))
    }

    /// Clear `expires_at` on a live, unexpired, unclaimed file.
    ///
    /// Returns `None` when the file no longer qualifies (expired, claimed by
    /// a reclamation worker, or deleted).
    pub async fn promote<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<file::Model>> {
        let now: DateTimeWithTimeZone = now.into();
        let changes = file::ActiveModel {
            expires_at: Set(None),
            ..Default::default()
        };

        let promoted = File::update_many()
            .set(changes)
            .filter(file::Column::Id.eq(id))
            .filter(file::Column::ClaimedAt.is_null())
            .filter(file::Column::RecordState.eq(RecordState::Active))
            .filter(
                Condition::any()
                    .add(file::Column::ExpiresAt.is_null())
                    .add(file::Column::ExpiresAt.gt(now)),
            )
            .exec_with_returning(conn)
            .await
            .map_err(AppError::db("promote file"))?;

        Ok(promoted.into_iter().next())
    }

    /// Atomically claim up to `limit` expired files for reclamation.
    pub async fn claim_expired<C: ConnectionTrait>(
        &self,
        conn: &C,
        now: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<file::Model>> {
        let now: DateTimeWithTimeZone = now.into();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        File::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                CLAIM_EXPIRED_SQL,
                [now.into(), limit.into(), file::MAX_DELETE_ATTEMPTS.into()],
            ))
            .all(conn)
            .await
            .map_err(AppError::db("claim expired files"))
    }

    /// Soft-delete a claimed file after its blob was removed.
    pub async fn mark_deleted<C: ConnectionTrait>(&self, conn: &C, id: &str) -> AppResult<bool> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let changes = file::ActiveModel {
            record_state: Set(RecordState::Deleted),
            deleted_at: Set(Some(now)),
            ..Default::default()
        };

        let result = File::update_many()
            .set(changes)
            .filter(file::Column::Id.eq(id))
            .filter(file::Column::RecordState.eq(RecordState::Active))
            .exec(conn)
            .await
            .map_err(AppError::db("mark file deleted"))?;

        Ok(result.rows_affected > 0)
    }

    /// Count a failed blob deletion and release the claim.
    ///
    /// Once the counter reaches [`file::MAX_DELETE_ATTEMPTS`] the claim query
    /// no longer selects the row.
    pub async fn record_failed_delete<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<bool> {
        let changes = file::ActiveModel {
            claimed_at: Set(None),
            ..Default::default()
        };

        let result = File::update_many()
            .set(changes)
            .col_expr(
                file::Column::FailedDeleteAttempts,
                Expr::col(file::Column::FailedDeleteAttempts).add(1),
            )
            .filter(file::Column::Id.eq(id))
            .filter(file::Column::RecordState.eq(RecordState::Active))
            .exec(conn)
            .await
            .map_err(AppError::db("record failed file delete"))?;

        Ok(result.rows_affected > 0)
    }

    /// Release claims taken before `cutoff`. Returns the number released.
    pub async fn release_stale_claims<C: ConnectionTrait>(
        &self,
        conn: &C,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        let changes = file::ActiveModel {
            claimed_at: Set(None),
            ..Default::default()
        };

        let result = File::update_many()
            .set(changes)
            .filter(file::Column::ClaimedAt.lt(cutoff))
            .filter(file::Column::RecordState.eq(RecordState::Active))
            .exec(conn)
            .await
            .map_err(AppError::db("release stale claims"))?;

        Ok(result.rows_affected)
    }
}
