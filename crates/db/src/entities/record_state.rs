//! Row liveness shared by every soft-deletable table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a row is logically alive.
///
/// Soft deletion flips this to [`RecordState::Deleted`] and stamps
/// `deleted_at`; queries filter on this column alone.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    #[sea_orm(string_value = "active")]
    #[default]
    Active,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl RecordState {
    /// Whether the row is alive.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}
