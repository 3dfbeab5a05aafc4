//! Status history repository. Entries are only ever appended.

use chrono::Utc;
use enrollment_common::{AppError, AppResult, IdGenerator, TenantScope};
use sea_orm::{ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{
    ParticipantStatusHistory, participant,
    participant::ParticipantStatus,
    participant_status_history::{self, HistoryEvent},
};

/// A history entry about to be written.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry<'a> {
    /// Participant as it is after the event.
    pub participant: &'a participant::Model,
    pub event: HistoryEvent,
    pub from_status: Option<ParticipantStatus>,
    pub actor_id: &'a str,
    pub reason: Option<&'a str>,
}

/// Status history repository.
#[derive(Debug, Clone, Default)]
pub struct StatusHistoryRepository {
    id_gen: IdGenerator,
}

impl StatusHistoryRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id_gen: IdGenerator::new(),
        }
    }

    /// Append an entry. `to_status` is the participant's current status.
    pub async fn append<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry: NewHistoryEntry<'_>,
    ) -> AppResult<participant_status_history::Model> {
        let model = participant_status_history::ActiveModel {
            id: Set(self.id_gen.generate()),
            tenant_id: Set(entry.participant.tenant_id.clone()),
            product_id: Set(entry.participant.product_id.clone()),
            participant_id: Set(entry.participant.id.clone()),
            event: Set(entry.event),
            from_status: Set(entry.from_status),
            to_status: Set(entry.participant.status),
            actor_id: Set(entry.actor_id.to_string()),
            reason: Set(entry.reason.map(ToString::to_string)),
            created_at: Set(Utc::now().into()),
        };

        ParticipantStatusHistory::insert(model)
            .exec_with_returning(conn)
            .await
            .map_err(AppError::db("append status history"))
    }

    /// All entries of a participant, oldest first.
    pub async fn list<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
    ) -> AppResult<Vec<participant_status_history::Model>> {
        ParticipantStatusHistory::find()
            .filter(participant_status_history::Column::TenantId.eq(scope.tenant_id.as_str()))
            .filter(participant_status_history::Column::ProductId.eq(scope.product_id.as_str()))
            .filter(participant_status_history::Column::ParticipantId.eq(participant_id))
            .order_by_asc(participant_status_history::Column::CreatedAt)
            .order_by_asc(participant_status_history::Column::Id)
            .all(conn)
            .await
            .map_err(AppError::db("list status history"))
    }
}
