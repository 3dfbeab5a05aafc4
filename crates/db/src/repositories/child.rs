//! Repository for participant child rows.
//!
//! One generic implementation serves all seven child tables; the table
//! specifics come from [`ChildEntity`].

use std::marker::PhantomData;

use enrollment_common::{AppError, AppResult, TenantScope};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder,
};

use super::versioned::{self, ChildEntity, scoped};

/// Child-row repository for entity `E`.
pub struct ChildRepository<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for ChildRepository<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for ChildRepository<E> {}

impl<E> Default for ChildRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ChildRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildRepository").finish()
    }
}

impl<E> ChildRepository<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E> ChildRepository<E>
where
    E: ChildEntity,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
{
    /// Live rows of a participant, oldest first.
    pub async fn list<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
    ) -> AppResult<Vec<E::Model>> {
        scoped::<E>(scope)
            .filter(E::participant_column().eq(participant_id))
            .order_by_asc(E::id_column())
            .all(conn)
            .await
            .map_err(AppError::db("list child rows"))
    }

    /// The live row of a single-row child (employment, pension).
    pub async fn find_single<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
    ) -> AppResult<Option<E::Model>> {
        scoped::<E>(scope)
            .filter(E::participant_column().eq(participant_id))
            .one(conn)
            .await
            .map_err(AppError::db("find child row"))
    }

    /// Load a live row and check that it belongs to `participant_id`.
    pub async fn get_owned<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        id: &str,
    ) -> AppResult<E::Model> {
        let row = versioned::find_live::<E, _>(conn, scope, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {id}", E::LABEL)))?;

        if E::owner_of(&row) != participant_id {
            return Err(AppError::Forbidden(format!(
                "{} {id} does not belong to participant {participant_id}",
                E::LABEL
            )));
        }

        Ok(row)
    }

    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: E::ActiveModel,
    ) -> AppResult<E::Model> {
        versioned::insert::<E, _>(conn, model).await
    }

    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
        read_version: i32,
        changes: E::ActiveModel,
    ) -> AppResult<E::Model> {
        versioned::update_versioned::<E, _>(conn, scope, id, read_version, changes).await
    }

    pub async fn soft_delete<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
        read_version: i32,
    ) -> AppResult<E::Model> {
        versioned::soft_delete_versioned::<E, _>(conn, scope, id, read_version).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::{ParticipantAddress, participant_address};
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_get_owned_other_participant_is_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::address("a1", "p2")]])
            .into_connection();

        let result = ChildRepository::<ParticipantAddress>::new()
            .get_owned(&db, &fixtures::scope(), "p1", "a1")
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_get_owned_missing_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<participant_address::Model>::new()])
            .into_connection();

        let result = ChildRepository::<ParticipantAddress>::new()
            .get_owned(&db, &fixtures::scope(), "p1", "a1")
            .await;
        match result {
            Err(AppError::NotFound(message)) => assert_eq!(message, "Address a1"),
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_returns_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[
                fixtures::address("a1", "p1"),
                fixtures::address("a2", "p1"),
            ]])
            .into_connection();

        let rows = ChildRepository::<ParticipantAddress>::new()
            .list(&db, &fixtures::scope(), "p1")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
