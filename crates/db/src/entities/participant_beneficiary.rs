//! Beneficiary of the pension benefits.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::record_state::RecordState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "participant_beneficiary")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,
    pub product_id: String,
    pub participant_id: String,

    pub full_name: String,

    /// Masterdata code (category `RELATIONSHIP`)
    pub relationship: String,

    #[sea_orm(nullable)]
    pub national_id: Option<String>,

    /// Share of the benefit in whole percent; live rows sum to 100.
    pub allocation_percent: i32,

    /// Supporting document
    #[sea_orm(nullable)]
    pub file_id: Option<String>,

    pub version: i32,
    pub record_state: RecordState,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeWithTimeZone>,
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
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::FileId",
        to = "super::file::Column::Id",
        on_delete = "SetNull"
    )]
    File,
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participant.def()
    }
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
