//! Participant entity (aggregate root of an enrollment).

use std::fmt;

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::record_state::RecordState;

/// Workflow status of a participant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    #[sea_orm(string_value = "DRAFT")]
    #[default]
    Draft,
    #[sea_orm(string_value = "PENDING_APPROVAL")]
    PendingApproval,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

impl ParticipantStatus {
    /// Child entities may only be changed while the participant is a draft.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Approved and rejected participants never change status again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data-entry stage of the enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    PersonalData,
    Identity,
    Address,
    BankAccount,
    Family,
    Employment,
    Pension,
    Beneficiary,
}

/// Which data-entry stages have been completed.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult,
)]
#[serde(default)]
pub struct StepsCompleted {
    pub personal_data: bool,
    pub identity: bool,
    pub address: bool,
    pub bank_account: bool,
    pub family: bool,
    pub employment: bool,
    pub pension: bool,
    pub beneficiary: bool,
}

impl StepsCompleted {
    fn flag_mut(&mut self, step: Step) -> &mut bool {
        match step {
            Step::PersonalData => &mut self.personal_data,
            Step::Identity => &mut self.identity,
            Step::Address => &mut self.address,
            Step::BankAccount => &mut self.bank_account,
            Step::Family => &mut self.family,
            Step::Employment => &mut self.employment,
            Step::Pension => &mut self.pension,
            Step::Beneficiary => &mut self.beneficiary,
        }
    }

    /// Whether a stage is done.
    #[must_use]
    pub const fn is_done(&self, step: Step) -> bool {
        match step {
            Step::PersonalData => self.personal_data,
            Step::Identity => self.identity,
            Step::Address => self.address,
            Step::BankAccount => self.bank_account,
            Step::Family => self.family,
            Step::Employment => self.employment,
            Step::Pension => self.pension,
            Step::Beneficiary => self.beneficiary,
        }
    }

    /// Return a copy with the stage marked done.
    #[must_use]
    pub fn with(mut self, step: Step) -> Self {
        *self.flag_mut(step) = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "participant")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub tenant_id: String,
    pub product_id: String,

    /// Owning user; `None` for records imported by the back office.
    #[sea_orm(nullable)]
    pub user_id: Option<String>,

    pub full_name: String,

    /// National identity number
    pub national_id: String,

    #[sea_orm(nullable)]
    pub date_of_birth: Option<Date>,

    #[sea_orm(nullable)]
    pub gender: Option<String>,

    #[sea_orm(nullable)]
    pub employee_number: Option<String>,

    #[sea_orm(nullable)]
    pub phone_number: Option<String>,

    #[sea_orm(nullable)]
    pub email: Option<String>,

    pub status: ParticipantStatus,

    #[sea_orm(column_type = "JsonBinary")]
    pub steps_completed: StepsCompleted,

    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,

    pub version: i32,
    pub record_state: RecordState,

    pub created_by: String,
    #[sea_orm(nullable)]
    pub submitted_by: Option<String>,
    #[sea_orm(nullable)]
    pub submitted_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(nullable)]
    pub approved_by: Option<String>,
    #[sea_orm(nullable)]
    pub approved_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(nullable)]
    pub rejected_by: Option<String>,
    #[sea_orm(nullable)]
    pub rejected_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    #[sea_orm(nullable)]
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::participant_pension::Entity")]
    Pension,
    #[sea_orm(has_many = "super::participant_status_history::Entity")]
    StatusHistory,
}

impl Related<super::participant_pension::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pension.def()
    }
}

impl Related<super::participant_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
