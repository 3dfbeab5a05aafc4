//! Participant (aggregate root) repository.

use enrollment_common::{AppError, AppResult, TenantScope};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    sea_query::{Expr, Func, LikeExpr},
};

use super::versioned::{self, scoped};
use crate::entities::{
    Participant, RecordState,
    participant::{self, ParticipantStatus, StepsCompleted},
    participant_pension,
};

/// Sortable participant columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParticipantSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    FullName,
    Status,
}

impl ParticipantSort {
    const fn column(self) -> participant::Column {
        match self {
            Self::CreatedAt => participant::Column::CreatedAt,
            Self::UpdatedAt => participant::Column::UpdatedAt,
            Self::FullName => participant::Column::FullName,
            Self::Status => participant::Column::Status,
        }
    }
}

/// Filters for listing participants.
#[derive(Debug, Clone)]
pub struct ParticipantFilter {
    pub status: Option<ParticipantStatus>,
    /// Case-insensitive match on name, national ID or employee number.
    pub search: Option<String>,
    pub sort: ParticipantSort,
    pub order: Order,
}

impl Default for ParticipantFilter {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            sort: ParticipantSort::default(),
            order: Order::Desc,
        }
    }
}

/// Participant repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticipantRepository;

impl ParticipantRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Find a live participant by ID.
    pub async fn find_live<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
    ) -> AppResult<Option<participant::Model>> {
        versioned::find_live::<Participant, _>(conn, scope, id).await
    }

    /// Get a live participant by ID, returning an error if not found.
    pub async fn get<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
    ) -> AppResult<participant::Model> {
        self.find_live(conn, scope, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Participant {id}")))
    }

    /// Load a participant for a child mutation.
    ///
    /// Takes a row lock so that child edits of one participant, and a submit
    /// racing with them, run one after another.
    pub async fn get_for_edit<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
    ) -> AppResult<participant::Model> {
        scoped::<Participant>(scope)
            .filter(participant::Column::Id.eq(id))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(AppError::db("load participant for edit"))?
            .ok_or_else(|| AppError::NotFound(format!("Participant {id}")))
    }

    /// Find the participant holding a national ID and an externally issued
    /// participant number.
    pub async fn find_by_identity<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        national_id: &str,
        participant_number: &str,
    ) -> AppResult<Option<participant::Model>> {
        scoped::<Participant>(scope)
            .join(JoinType::InnerJoin, participant::Relation::Pension.def())
            .filter(participant::Column::NationalId.eq(national_id))
            .filter(participant_pension::Column::ParticipantNumber.eq(participant_number))
            .filter(participant_pension::Column::RecordState.eq(RecordState::Active))
            .one(conn)
            .await
            .map_err(AppError::db("find participant by identity"))
    }

    /// Find the participant owned by a user.
    pub async fn find_by_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        user_id: &str,
    ) -> AppResult<Option<participant::Model>> {
        scoped::<Participant>(scope)
            .filter(participant::Column::UserId.eq(user_id))
            .one(conn)
            .await
            .map_err(AppError::db("find participant by user"))
    }

    /// List participants. Returns one page and the total number of matches.
    pub async fn list<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        filter: &ParticipantFilter,
        page_index: u64,
        per_page: u64,
    ) -> AppResult<(Vec<participant::Model>, u64)> {
        let mut query = scoped::<Participant>(scope);

        if let Some(status) = filter.status {
            query = query.filter(participant::Column::Status.eq(status));
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            let matches = |column: participant::Column| {
                Expr::expr(Func::lower(Expr::col((Participant, column))))
                    .like(LikeExpr::new(pattern.clone()).escape('\\'))
            };
            query = query.filter(
                Condition::any()
                    .add(matches(participant::Column::FullName))
                    .add(matches(participant::Column::NationalId))
                    .add(matches(participant::Column::EmployeeNumber)),
            );
        }

        let total = query
            .clone()
            .count(conn)
            .await
            .map_err(AppError::db("count participants"))?;

        let items = query
            .order_by(filter.sort.column(), filter.order.clone())
            .order_by(participant::Column::Id, filter.order.clone())
            .offset(page_index * per_page)
            .limit(per_page)
            .all(conn)
            .await
            .map_err(AppError::db("list participants"))?;

        Ok((items, total))
    }

    /// Insert a new participant.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: participant::ActiveModel,
    ) -> AppResult<participant::Model> {
        versioned::insert::<Participant, _>(conn, model).await
    }

    /// Apply changes guarded by the version the caller read.
    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
        read_version: i32,
        changes: participant::ActiveModel,
    ) -> AppResult<participant::Model> {
        versioned::update_versioned::<Participant, _>(conn, scope, id, read_version, changes).await
    }

    /// Record completed steps without advancing the version.
    ///
    /// Callers hold the row lock from [`Self::get_for_edit`] and pass the
    /// version they locked. Step progress is bookkeeping; a client holding
    /// that version may still submit afterwards.
    pub async fn set_steps<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
        locked_version: i32,
        steps: StepsCompleted,
    ) -> AppResult<()> {
        let changes = participant::ActiveModel {
            steps_completed: Set(steps),
            ..Default::default()
        };

        let result = Participant::update_many()
            .set(changes)
            .filter(participant::Column::Id.eq(id))
            .filter(participant::Column::Version.eq(locked_version))
            .filter(participant::Column::TenantId.eq(scope.tenant_id.as_str()))
            .filter(participant::Column::ProductId.eq(scope.product_id.as_str()))
            .filter(participant::Column::RecordState.eq(RecordState::Active))
            .exec(conn)
            .await
            .map_err(AppError::db("record participant steps"))?;

        if result.rows_affected == 0 {
            return Err(AppError::stale_version("Participant", id));
        }
        Ok(())
    }

    /// Attach an owner to a participant that has none.
    ///
    /// Succeeds only while the row is still unowned and at `read_version`, so
    /// two racing registrations cannot both link the same record.
    pub async fn link_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
        read_version: i32,
        user_id: &str,
    ) -> AppResult<participant::Model> {
        let changes = participant::ActiveModel {
            user_id: Set(Some(user_id.to_string())),
            ..Default::default()
        };

        let linked = Participant::update_many()
            .set(changes)
            .col_expr(
                participant::Column::Version,
                Expr::col(participant::Column::Version).add(1),
            )
            .col_expr(
                participant::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(chrono::Utc::now())),
            )
            .filter(participant::Column::Id.eq(id))
            .filter(participant::Column::Version.eq(read_version))
            .filter(participant::Column::UserId.is_null())
            .filter(participant::Column::TenantId.eq(scope.tenant_id.as_str()))
            .filter(participant::Column::ProductId.eq(scope.product_id.as_str()))
            .filter(participant::Column::RecordState.eq(RecordState::Active))
            .exec_with_returning(conn)
            .await
            .map_err(AppError::db("link participant"))?;

        linked.into_iter().next().ok_or_else(|| {
            AppError::Conflict(format!("Participant {id} is already registered"))
        })
    }
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
