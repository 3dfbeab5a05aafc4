//! Append-only audit trail of participant status changes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::participant::ParticipantStatus;

/// What produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum HistoryEvent {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    /// A self-registering user was attached to an imported record.
    #[sea_orm(string_value = "linked")]
    Linked,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "participant_status_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,
    pub product_id: String,
    pub participant_id: String,

    pub event: HistoryEvent,

    /// `None` only for the creation entry
    #[sea_orm(nullable)]
    pub from_status: Option<ParticipantStatus>,

    pub to_status: ParticipantStatus,

    pub actor_id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::participant::Entity",
        from = "Column::ParticipantId",
        to = "super::participant::Column::Id",
        on_delete = "Cascade"
    )]
    Participant,
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
