//! Uploaded document entity.
//!
//! A file starts temporary (`expires_at` set), becomes permanent when a
//! finalized child record references it (`expires_at` cleared), and is
//! otherwise reclaimed once expired. `claimed_at` marks a reclamation in
//! flight.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::record_state::RecordState;

/// Deletion attempts after which a file is parked for manual intervention.
pub const MAX_DELETE_ATTEMPTS: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,
    pub product_id: String,
    pub participant_id: String,

    /// Logical placement, e.g. `identity_card`
    pub field_name: String,

    /// Uploading user
    pub uploaded_by: String,

    pub bucket: String,
    pub storage_key: String,

    /// Original file name
    pub original_name: String,

    /// MIME type
    pub content_type: String,

    /// File size in bytes
    pub size: i64,

    #[sea_orm(nullable)]
    pub md5: Option<String>,

    /// `None` once the file is permanent
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Set while a reclamation worker owns the row
    #[sea_orm(nullable)]
    pub claimed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(default_value = 0)]
    pub failed_delete_attempts: i32,

    pub record_state: RecordState,
    pub created_at: DateTimeWithTimeZone,
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the file has been promoted to permanent.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
