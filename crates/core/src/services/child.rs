//! Input types for participant child records.
//!
//! Each input knows which table it writes, which data-entry step it
//! completes and which of its fields are masterdata codes. The generic save,
//! delete and replace operations in [`super::participant`] work from that.

use chrono::NaiveDate;
use enrollment_common::{AppError, AppResult, TenantScope, field_error};
use enrollment_db::{
    entities::{
        ParticipantAddress, ParticipantBankAccount, ParticipantBeneficiary, ParticipantEmployment,
        ParticipantFamilyMember, ParticipantIdentity, ParticipantPension, RecordState,
        participant::Step, participant_address, participant_bank_account,
        participant_beneficiary, participant_employment, participant_family_member,
        participant_identity, participant_pension,
    },
    repositories::ChildEntity,
};
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set, prelude::DateTimeWithTimeZone};
use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use super::collaborators::categories;

/// A masterdata code carried by an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeField<'a> {
    pub field: &'static str,
    pub category: &'static str,
    pub code: &'a str,
}

const fn code<'a>(field: &'static str, category: &'static str, code: &'a str) -> CodeField<'a> {
    CodeField {
        field,
        category,
        code,
    }
}

/// Active model type of a child input.
pub type ChildActiveModel<I> = <<I as ChildInput>::Entity as EntityTrait>::ActiveModel;

/// Input that creates or updates one child row.
pub trait ChildInput: Validate + Send + Sync {
    type Entity: ChildEntity;

    /// Step marked done by the first successful save.
    const STEP: Step;

    /// At most one live row per participant.
    const SINGLE: bool = false;

    /// Existing row to update; `None` creates a new row.
    fn id(&self) -> Option<&str>;

    /// Version the caller read; required with [`ChildInput::id`].
    fn version(&self) -> Option<i32>;

    /// Referenced document, promoted to permanent on save.
    fn file_id(&self) -> Option<&str> {
        None
    }

    fn code_fields(&self) -> Vec<CodeField<'_>>;

    /// Payload columns only; keys, version and timestamps are left unset.
    fn changes(&self) -> ChildActiveModel<Self>;

    /// Rules beyond field validation.
    fn check(&self) -> AppResult<()> {
        Ok(())
    }

    /// Rules over a complete replacement set.
    fn check_collection(_items: &[Self]) -> AppResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }

    /// Whether a single save must see the participant's other live rows.
    fn checks_siblings(&self) -> bool {
        false
    }

    /// Rules against the participant's live rows, run on single saves when
    /// [`ChildInput::checks_siblings`] holds.
    fn check_siblings(&self, _siblings: &[<Self::Entity as EntityTrait>::Model]) -> AppResult<()> {
        Ok(())
    }
}

/// Build a full row for a new child from its payload.
pub fn new_row<I>(
    input: &I,
    id: String,
    scope: &TenantScope,
    participant_id: &str,
    now: DateTimeWithTimeZone,
) -> ChildActiveModel<I>
where
    I: ChildInput,
    ChildActiveModel<I>: ActiveModelTrait<Entity = I::Entity>,
    <I::Entity as EntityTrait>::Model: IntoActiveModel<ChildActiveModel<I>>,
{
    use enrollment_db::repositories::VersionedEntity as _;

    let mut model = input.changes();
    model.set(I::Entity::id_column(), id.into());
    model.set(I::Entity::tenant_column(), scope.tenant_id.clone().into());
    model.set(I::Entity::product_column(), scope.product_id.clone().into());
    model.set(I::Entity::participant_column(), participant_id.into());
    model.set(I::Entity::version_column(), 1_i32.into());
    model.set(I::Entity::record_state_column(), RecordState::Active.into());
    model.set(I::Entity::created_at_column(), now.into());
    model.set(I::Entity::updated_at_column(), now.into());
    model
}

fn date_order(
    earlier: Option<NaiveDate>,
    later: Option<NaiveDate>,
    field: &'static str,
    message: &str,
) -> AppResult<()> {
    match (earlier, later) {
        (Some(a), Some(b)) if b < a => Err(AppError::field(field, "date_order", message)),
        _ => Ok(()),
    }
}

fn not_in_future(date: Option<NaiveDate>, field: &'static str) -> AppResult<()> {
    match date {
        Some(d) if d > chrono::Utc::now().date_naive() => Err(AppError::field(
            field,
            "future_date",
            "Date cannot be in the future",
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IdentityInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 32))]
    pub identity_type: String,
    #[validate(length(min = 1, max = 64))]
    pub identity_number: String,
    pub issued_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub file_id: Option<String>,
}

impl ChildInput for IdentityInput {
    type Entity = ParticipantIdentity;
    const STEP: Step = Step::Identity;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }
    fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        vec![code("identity_type", categories::IDENTITY_TYPE, &self.identity_type)]
    }

    fn changes(&self) -> participant_identity::ActiveModel {
        participant_identity::ActiveModel {
            identity_type: Set(self.identity_type.clone()),
            identity_number: Set(self.identity_number.trim().to_string()),
            issued_date: Set(self.issued_date),
            expiry_date: Set(self.expiry_date),
            file_id: Set(self.file_id.clone()),
            ..Default::default()
        }
    }

    fn check(&self) -> AppResult<()> {
        not_in_future(self.issued_date, "issued_date")?;
        date_order(
            self.issued_date,
            self.expiry_date,
            "expiry_date",
            "Expiry date must not be before the issue date",
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 32))]
    pub address_type: String,
    #[validate(length(min = 1, max = 1000))]
    pub street: String,
    #[validate(length(min = 1, max = 128))]
    pub city: String,
    #[validate(length(min = 1, max = 128))]
    pub province: String,
    #[validate(length(max = 16))]
    pub postal_code: Option<String>,
    #[validate(length(min = 2, max = 8))]
    pub country_code: String,
}

impl ChildInput for AddressInput {
    type Entity = ParticipantAddress;
    const STEP: Step = Step::Address;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        vec![
            code("address_type", categories::ADDRESS_TYPE, &self.address_type),
            code("country_code", categories::COUNTRY, &self.country_code),
        ]
    }

    fn changes(&self) -> participant_address::ActiveModel {
        participant_address::ActiveModel {
            address_type: Set(self.address_type.clone()),
            street: Set(self.street.clone()),
            city: Set(self.city.clone()),
            province: Set(self.province.clone()),
            postal_code: Set(self.postal_code.clone()),
            country_code: Set(self.country_code.to_ascii_uppercase()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BankAccountInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 32))]
    pub bank_code: String,
    #[validate(length(min = 4, max = 64))]
    pub account_number: String,
    #[validate(length(min = 1, max = 256))]
    pub account_holder_name: String,
    #[validate(length(equal = 3))]
    pub currency_code: String,
    #[serde(default)]
    pub is_primary: bool,
    pub file_id: Option<String>,
}

impl ChildInput for BankAccountInput {
    type Entity = ParticipantBankAccount;
    const STEP: Step = Step::BankAccount;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }
    fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        vec![
            code("bank_code", categories::BANK, &self.bank_code),
            code("currency_code", categories::CURRENCY, &self.currency_code),
        ]
    }

    fn changes(&self) -> participant_bank_account::ActiveModel {
        participant_bank_account::ActiveModel {
            bank_code: Set(self.bank_code.clone()),
            account_number: Set(self.account_number.trim().to_string()),
            account_holder_name: Set(self.account_holder_name.clone()),
            currency_code: Set(self.currency_code.to_ascii_uppercase()),
            is_primary: Set(self.is_primary),
            file_id: Set(self.file_id.clone()),
            ..Default::default()
        }
    }

    fn check(&self) -> AppResult<()> {
        if self.account_number.trim().chars().all(|c| c.is_ascii_digit()) {
            Ok(())
        } else {
            Err(AppError::field(
                "account_number",
                "digits",
                "Account number must contain digits only",
            ))
        }
    }

    fn check_collection(items: &[Self]) -> AppResult<()> {
        if items.iter().filter(|a| a.is_primary).count() > 1 {
            return Err(second_primary());
        }
        Ok(())
    }

    fn checks_siblings(&self) -> bool {
        self.is_primary
    }

    fn check_siblings(&self, siblings: &[participant_bank_account::Model]) -> AppResult<()> {
        let other_primary = siblings
            .iter()
            .any(|row| row.is_primary && self.id.as_deref() != Some(row.id.as_str()));
        if other_primary {
            return Err(second_primary());
        }
        Ok(())
    }
}

fn second_primary() -> AppError {
    AppError::field(
        "is_primary",
        "single_primary",
        "Only one bank account can be primary",
    )
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FamilyMemberInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 256))]
    pub full_name: String,
    #[validate(length(min = 1, max = 32))]
    pub relationship: String,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub is_dependent: bool,
    pub file_id: Option<String>,
}

impl ChildInput for FamilyMemberInput {
    type Entity = ParticipantFamilyMember;
    const STEP: Step = Step::Family;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }
    fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        vec![code("relationship", categories::RELATIONSHIP, &self.relationship)]
    }

    fn changes(&self) -> participant_family_member::ActiveModel {
        participant_family_member::ActiveModel {
            full_name: Set(self.full_name.trim().to_string()),
            relationship: Set(self.relationship.clone()),
            date_of_birth: Set(self.date_of_birth),
            is_dependent: Set(self.is_dependent),
            file_id: Set(self.file_id.clone()),
            ..Default::default()
        }
    }

    fn check(&self) -> AppResult<()> {
        not_in_future(self.date_of_birth, "date_of_birth")
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmploymentInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 256))]
    pub employer_name: String,
    #[validate(length(min = 1, max = 32))]
    pub occupation_code: String,
    #[validate(length(max = 128))]
    pub position: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub employment_status: String,
    #[validate(length(min = 1, max = 32))]
    pub income_range_code: Option<String>,
    pub start_date: Option<NaiveDate>,
}

impl ChildInput for EmploymentInput {
    type Entity = ParticipantEmployment;
    const STEP: Step = Step::Employment;
    const SINGLE: bool = true;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        let mut fields = vec![
            code("occupation_code", categories::OCCUPATION, &self.occupation_code),
            code(
                "employment_status",
                categories::EMPLOYMENT_STATUS,
                &self.employment_status,
            ),
        ];
        if let Some(income) = self.income_range_code.as_deref() {
            fields.push(code("income_range_code", categories::INCOME_RANGE, income));
        }
        fields
    }

    fn changes(&self) -> participant_employment::ActiveModel {
        participant_employment::ActiveModel {
            employer_name: Set(self.employer_name.trim().to_string()),
            occupation_code: Set(self.occupation_code.clone()),
            position: Set(self.position.clone()),
            employment_status: Set(self.employment_status.clone()),
            income_range_code: Set(self.income_range_code.clone()),
            start_date: Set(self.start_date),
            ..Default::default()
        }
    }

    fn check(&self) -> AppResult<()> {
        not_in_future(self.start_date, "start_date")
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PensionInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 64))]
    pub participant_number: String,
    #[validate(length(min = 1, max = 32))]
    pub program_code: Option<String>,
    pub effective_date: Option<NaiveDate>,
    #[validate(range(min = 40, max = 75))]
    pub retirement_age: Option<i32>,
}

impl ChildInput for PensionInput {
    type Entity = ParticipantPension;
    const STEP: Step = Step::Pension;
    const SINGLE: bool = true;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        self.program_code
            .as_deref()
            .map(|program| code("program_code", categories::PENSION_PROGRAM, program))
            .into_iter()
            .collect()
    }

    fn changes(&self) -> participant_pension::ActiveModel {
        participant_pension::ActiveModel {
            participant_number: Set(self.participant_number.trim().to_string()),
            program_code: Set(self.program_code.clone()),
            effective_date: Set(self.effective_date),
            retirement_age: Set(self.retirement_age),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BeneficiaryInput {
    pub id: Option<String>,
    pub version: Option<i32>,
    #[validate(length(min = 1, max = 256))]
    pub full_name: String,
    #[validate(length(min = 1, max = 32))]
    pub relationship: String,
    #[validate(length(min = 4, max = 32))]
    pub national_id: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub allocation_percent: i32,
    pub file_id: Option<String>,
}

/// Total allocation a complete beneficiary set must reach.
pub const FULL_ALLOCATION: i32 = 100;

impl ChildInput for BeneficiaryInput {
    type Entity = ParticipantBeneficiary;
    const STEP: Step = Step::Beneficiary;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn version(&self) -> Option<i32> {
        self.version
    }
    fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    fn code_fields(&self) -> Vec<CodeField<'_>> {
        vec![code("relationship", categories::RELATIONSHIP, &self.relationship)]
    }

    fn changes(&self) -> participant_beneficiary::ActiveModel {
        participant_beneficiary::ActiveModel {
            full_name: Set(self.full_name.trim().to_string()),
            relationship: Set(self.relationship.clone()),
            national_id: Set(self.national_id.clone()),
            allocation_percent: Set(self.allocation_percent),
            file_id: Set(self.file_id.clone()),
            ..Default::default()
        }
    }

    fn check_collection(items: &[Self]) -> AppResult<()> {
        let total: i32 = items.iter().map(|b| b.allocation_percent).sum();
        if items.is_empty() || total == FULL_ALLOCATION {
            Ok(())
        } else {
            Err(AppError::field(
                "allocation_percent",
                "allocation_total",
                format!("Beneficiary allocations must total {FULL_ALLOCATION}%, got {total}%"),
            ))
        }
    }
}

/// Run derive validation and the input's own rules.
pub fn validate_input<I: ChildInput>(input: &I) -> AppResult<()> {
    input.validate()?;
    input.check()
}

/// Merge masterdata failures into one field-scoped validation error.
pub fn code_errors(failures: Vec<(&'static str, String)>) -> AppResult<()> {
    if failures.is_empty() {
        return Ok(());
    }
    let mut errors = ValidationErrors::new();
    for (field, message) in failures {
        errors.add(field, field_error("masterdata", message));
    }
    Err(AppError::Validation(errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beneficiary(percent: i32) -> BeneficiaryInput {
        BeneficiaryInput {
            id: None,
            version: None,
            full_name: "Budi".to_string(),
            relationship: "SPOUSE".to_string(),
            national_id: None,
            allocation_percent: percent,
            file_id: None,
        }
    }

    #[test]
    fn test_beneficiary_allocation_must_total_hundred() {
        assert!(BeneficiaryInput::check_collection(&[beneficiary(60), beneficiary(40)]).is_ok());
        assert!(BeneficiaryInput::check_collection(&[]).is_ok());
        assert!(matches!(
            BeneficiaryInput::check_collection(&[beneficiary(60), beneficiary(30)]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_beneficiary_percent_range() {
        assert!(validate_input(&beneficiary(0)).is_err());
        assert!(validate_input(&beneficiary(101)).is_err());
        assert!(validate_input(&beneficiary(100)).is_ok());
    }

    #[test]
    fn test_identity_expiry_before_issue_is_rejected() {
        let input = IdentityInput {
            id: None,
            version: None,
            identity_type: "KTP".to_string(),
            identity_number: "123".to_string(),
            issued_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            expiry_date: NaiveDate::from_ymd_opt(2019, 1, 1),
            file_id: None,
        };
        match validate_input(&input) {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("expiry_date"));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_bank_account_single_primary() {
        let account = |primary| BankAccountInput {
            id: None,
            version: None,
            bank_code: "BCA".to_string(),
            account_number: "12345678".to_string(),
            account_holder_name: "Siti".to_string(),
            currency_code: "IDR".to_string(),
            is_primary: primary,
            file_id: None,
        };
        assert!(BankAccountInput::check_collection(&[account(true), account(false)]).is_ok());
        assert!(BankAccountInput::check_collection(&[account(true), account(true)]).is_err());
    }

    #[test]
    fn test_primary_account_checked_against_live_rows() {
        let mut stored = enrollment_db::test_utils::fixtures::bank_account("b1", "p1");
        stored.is_primary = true;
        let mut input = BankAccountInput {
            id: None,
            version: None,
            bank_code: "BCA".to_string(),
            account_number: "12345678".to_string(),
            account_holder_name: "Siti".to_string(),
            currency_code: "IDR".to_string(),
            is_primary: true,
            file_id: None,
        };

        assert!(input.checks_siblings());
        assert!(input.check_siblings(std::slice::from_ref(&stored)).is_err());

        // Re-saving the primary account itself is fine.
        input.id = Some("b1".to_string());
        assert!(input.check_siblings(&[stored]).is_ok());

        input.is_primary = false;
        assert!(!input.checks_siblings());
    }

    #[test]
    fn test_optional_codes_only_when_present() {
        let pension = PensionInput {
            id: None,
            version: None,
            participant_number: "P-1".to_string(),
            program_code: None,
            effective_date: None,
            retirement_age: None,
        };
        assert!(pension.code_fields().is_empty());
    }

    #[test]
    fn test_code_errors_are_field_scoped() {
        match code_errors(vec![("bank_code", "Unknown BANK code X".to_string())]) {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("bank_code"));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }
}
