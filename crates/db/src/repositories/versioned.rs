//! Optimistic concurrency for versioned rows.
//!
//! Every mutation of a versioned row is a single conditional statement:
//! `UPDATE … SET …, version = version + 1 WHERE id = $id AND version = $read
//! RETURNING *`. Zero returned rows means someone else won the race; the
//! caller gets [`AppError::Conflict`] and the stored row is untouched.

use chrono::Utc;
use enrollment_common::{AppError, AppResult, TenantScope};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, Select, SqlErr, prelude::DateTimeWithTimeZone, sea_query::Expr,
};

use crate::entities::{self, RecordState};

/// A table carrying tenant scope, a version counter and a liveness state.
pub trait VersionedEntity: EntityTrait {
    /// Human-readable name used in error messages.
    const LABEL: &'static str;

    fn id_column() -> Self::Column;
    fn tenant_column() -> Self::Column;
    fn product_column() -> Self::Column;
    fn version_column() -> Self::Column;
    fn record_state_column() -> Self::Column;
    fn created_at_column() -> Self::Column;
    fn updated_at_column() -> Self::Column;
    fn deleted_at_column() -> Self::Column;

    fn id_of(model: &Self::Model) -> &str;
    fn version_of(model: &Self::Model) -> i32;
}

/// A versioned table whose rows belong to exactly one participant.
pub trait ChildEntity: VersionedEntity {
    fn participant_column() -> Self::Column;

    /// Participant that owns a loaded row.
    fn owner_of(model: &Self::Model) -> &str;
}

macro_rules! versioned_entity {
    ($module:ident, $label:literal) => {
        impl VersionedEntity for entities::$module::Entity {
            const LABEL: &'static str = $label;

            fn id_column() -> Self::Column {
                entities::$module::Column::Id
            }
            fn tenant_column() -> Self::Column {
                entities::$module::Column::TenantId
            }
            fn product_column() -> Self::Column {
                entities::$module::Column::ProductId
            }
            fn version_column() -> Self::Column {
                entities::$module::Column::Version
            }
            fn record_state_column() -> Self::Column {
                entities::$module::Column::RecordState
            }
            fn created_at_column() -> Self::Column {
                entities::$module::Column::CreatedAt
            }
            fn updated_at_column() -> Self::Column {
                entities::$module::Column::UpdatedAt
            }
            fn deleted_at_column() -> Self::Column {
                entities::$module::Column::DeletedAt
            }

            fn id_of(model: &Self::Model) -> &str {
                &model.id
            }
            fn version_of(model: &Self::Model) -> i32 {
                model.version
            }
        }
    };
}

macro_rules! child_entity {
    ($module:ident, $label:literal) => {
        versioned_entity!($module, $label);

        impl ChildEntity for entities::$module::Entity {
            fn participant_column() -> Self::Column {
                entities::$module::Column::ParticipantId
            }
            fn owner_of(model: &Self::Model) -> &str {
                &model.participant_id
            }
        }
    };
}

versioned_entity!(participant, "Participant");
child_entity!(participant_identity, "Identity");
child_entity!(participant_address, "Address");
child_entity!(participant_bank_account, "Bank account");
child_entity!(participant_family_member, "Family member");
child_entity!(participant_employment, "Employment");
child_entity!(participant_pension, "Pension");
child_entity!(participant_beneficiary, "Beneficiary");

/// Live rows of `E` inside a tenant scope.
pub fn scoped<E: VersionedEntity>(scope: &TenantScope) -> Select<E> {
    E::find()
        .filter(E::tenant_column().eq(scope.tenant_id.as_str()))
        .filter(E::product_column().eq(scope.product_id.as_str()))
        .filter(E::record_state_column().eq(RecordState::Active))
}

/// Find a live row by ID inside a tenant scope.
pub async fn find_live<E, C>(conn: &C, scope: &TenantScope, id: &str) -> AppResult<Option<E::Model>>
where
    E: VersionedEntity,
    C: ConnectionTrait,
{
    scoped::<E>(scope)
        .filter(E::id_column().eq(id))
        .one(conn)
        .await
        .map_err(AppError::db("find versioned row"))
}

/// Insert a new row and return it as stored.
pub async fn insert<E, C>(conn: &C, model: E::ActiveModel) -> AppResult<E::Model>
where
    E: VersionedEntity,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
    E::Model: IntoActiveModel<E::ActiveModel>,
    C: ConnectionTrait,
{
    E::insert(model)
        .exec_with_returning(conn)
        .await
        .map_err(insert_error(E::LABEL, "insert versioned row"))
}

/// Map an insert failure. A unique index violation means a concurrent
/// request created the same row first and becomes [`AppError::Conflict`].
pub(crate) fn insert_error(
    label: &'static str,
    operation: &'static str,
) -> impl FnOnce(DbErr) -> AppError {
    move |err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            tracing::debug!(entity = label, detail = %detail, "Unique constraint violated");
            AppError::Conflict(format!("{label} already exists; re-fetch and retry"))
        }
        _ => AppError::db(operation)(err),
    }
}

/// Apply `changes` to the row if its stored version still equals `read_version`.
///
/// `changes` must leave `version`, `updated_at` and the key columns unset;
/// they are managed here. On success the returned model carries
/// `read_version + 1`.
pub async fn update_versioned<E, C>(
    conn: &C,
    scope: &TenantScope,
    id: &str,
    read_version: i32,
    changes: E::ActiveModel,
) -> AppResult<E::Model>
where
    E: VersionedEntity,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
    C: ConnectionTrait,
{
    let now: DateTimeWithTimeZone = Utc::now().into();

    let updated = E::update_many()
        .set(changes)
        .col_expr(E::version_column(), Expr::col(E::version_column()).add(1))
        .col_expr(E::updated_at_column(), Expr::value(now))
        .filter(E::id_column().eq(id))
        .filter(E::version_column().eq(read_version))
        .filter(E::tenant_column().eq(scope.tenant_id.as_str()))
        .filter(E::product_column().eq(scope.product_id.as_str()))
        .filter(E::record_state_column().eq(RecordState::Active))
        .exec_with_returning(conn)
        .await
        .map_err(AppError::db("versioned update"))?;

    single_or_conflict::<E>(updated, id, read_version)
}

/// Soft-delete the row if its stored version still equals `read_version`.
pub async fn soft_delete_versioned<E, C>(
    conn: &C,
    scope: &TenantScope,
    id: &str,
    read_version: i32,
) -> AppResult<E::Model>
where
    E: VersionedEntity,
    C: ConnectionTrait,
{
    let now: DateTimeWithTimeZone = Utc::now().into();

    let deleted = E::update_many()
        .col_expr(E::record_state_column(), Expr::value(RecordState::Deleted))
        .col_expr(E::deleted_at_column(), Expr::value(now))
        .col_expr(E::version_column(), Expr::col(E::version_column()).add(1))
        .col_expr(E::updated_at_column(), Expr::value(now))
        .filter(E::id_column().eq(id))
        .filter(E::version_column().eq(read_version))
        .filter(E::tenant_column().eq(scope.tenant_id.as_str()))
        .filter(E::product_column().eq(scope.product_id.as_str()))
        .filter(E::record_state_column().eq(RecordState::Active))
        .exec_with_returning(conn)
        .await
        .map_err(AppError::db("versioned soft delete"))?;

    single_or_conflict::<E>(deleted, id, read_version)
}

fn single_or_conflict<E: VersionedEntity>(
    rows: Vec<E::Model>,
    id: &str,
    read_version: i32,
) -> AppResult<E::Model> {
    rows.into_iter().next().ok_or_else(|| {
        tracing::debug!(
            entity = E::LABEL,
            id = %id,
            read_version,
            "Optimistic version check failed"
        );
        AppError::stale_version(E::LABEL, id)
    })
}
