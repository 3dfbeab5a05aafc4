//! Employment details (one live row per participant).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::record_state::RecordState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "participant_employment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,
    pub product_id: String,
    pub participant_id: String,

    pub employer_name: String,

    /// Masterdata code (category `OCCUPATION`)
    pub occupation_code: String,

    #[sea_orm(nullable)]
    pub position: Option<String>,

    /// Masterdata code (category `EMPLOYMENT_STATUS`)
    pub employment_status: String,

    /// Masterdata code (category `INCOME_RANGE`)
    #[sea_orm(nullable)]
    pub income_range_code: Option<String>,

    #[sea_orm(nullable)]
    pub start_date: Option<Date>,

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
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
