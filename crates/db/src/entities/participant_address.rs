//! Postal address of a participant.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::record_state::RecordState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "participant_address")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,
    pub product_id: String,
    pub participant_id: String,

    /// Masterdata code (category `ADDRESS_TYPE`), e.g. domicile or ID-card address
    pub address_type: String,

    #[sea_orm(column_type = "Text")]
    pub street: String,

    pub city: String,
    pub province: String,

    #[sea_orm(nullable)]
    pub postal_code: Option<String>,

    /// Masterdata code (category `COUNTRY`)
    pub country_code: String,

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
