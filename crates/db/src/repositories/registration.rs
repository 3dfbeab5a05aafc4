//! Self-registration tracking repository.

use chrono::Utc;
use enrollment_common::{AppError, AppResult, TenantScope};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};

use super::versioned::insert_error;
use crate::entities::{
    ParticipantRegistration,
    participant_registration::{self, RegistrationStatus},
};

/// Registration repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationRepository;

impl RegistrationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: participant_registration::ActiveModel,
    ) -> AppResult<participant_registration::Model> {
        ParticipantRegistration::insert(model)
            .exec_with_returning(conn)
            .await
            .map_err(insert_error("Registration", "insert registration"))
    }

    /// Close the open registration of a participant with a review outcome.
    ///
    /// Participants created by the back office have no registration; that is
    /// not an error and yields `None`.
    pub async fn close_pending<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        outcome: RegistrationStatus,
        reviewer_id: &str,
    ) -> AppResult<Option<participant_registration::Model>> {
        let changes = participant_registration::ActiveModel {
            status: Set(outcome),
            reviewed_by: Set(Some(reviewer_id.to_string())),
            reviewed_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };

        let closed = ParticipantRegistration::update_many()
            .set(changes)
            .filter(participant_registration::Column::TenantId.eq(scope.tenant_id.as_str()))
            .filter(participant_registration::Column::ProductId.eq(scope.product_id.as_str()))
            .filter(participant_registration::Column::ParticipantId.eq(participant_id))
            .filter(participant_registration::Column::Status.eq(RegistrationStatus::Pending))
            .exec_with_returning(conn)
            .await
            .map_err(AppError::db("close registration"))?;

        Ok(closed.into_iter().next())
    }
}
