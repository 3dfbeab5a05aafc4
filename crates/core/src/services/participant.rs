//! Participant aggregate service.
//!
//! Every child mutation loads the root under the editable-state guard,
//! checks ownership, validates masterdata codes, writes through the
//! optimistic version check and promotes referenced files, all in one
//! transaction.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, Utc};
use enrollment_common::{AppError, AppResult, IdGenerator, TenantScope};
use enrollment_db::{
    entities::{
        ParticipantAddress, ParticipantBankAccount, ParticipantBeneficiary, ParticipantEmployment,
        ParticipantFamilyMember, ParticipantIdentity, ParticipantPension, RecordState, participant,
        participant::{ParticipantStatus, Step, StepsCompleted},
        participant_address, participant_bank_account, participant_beneficiary,
        participant_employment, participant_family_member, participant_identity,
        participant_pension, participant_status_history,
        participant_status_history::HistoryEvent,
    },
    repositories::{
        ChildEntity, ChildRepository, ParticipantFilter, ParticipantRepository, ParticipantSort,
        StatusHistoryRepository, VersionedEntity, status_history::NewHistoryEntry,
    },
};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel, Order, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use super::child::{
    AddressInput, BankAccountInput, BeneficiaryInput, ChildActiveModel, ChildInput, CodeField,
    EmploymentInput, FamilyMemberInput, IdentityInput, PensionInput, code_errors, new_row,
    validate_input,
};
use super::collaborators::MasterdataValidator;
use super::file_lifecycle::FileLifecycleService;
use super::guard::EditableStateGuard;
use super::transaction::TransactionManager;

/// Default page size for participant lists.
pub const DEFAULT_PER_PAGE: u64 = 20;

/// Largest page size for participant lists.
pub const MAX_PER_PAGE: u64 = 100;

#[allow(clippy::unwrap_used)]
static NATIONAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z]{4,32}$").unwrap());

/// Identity and contact data of a participant.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PersonalDataInput {
    #[validate(length(min = 1, max = 256))]
    pub full_name: String,
    pub national_id: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    #[validate(length(max = 64))]
    pub employee_number: Option<String>,
    #[validate(length(min = 6, max = 32))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

impl PersonalDataInput {
    pub(crate) fn check(&self) -> AppResult<()> {
        self.validate()?;

        if !NATIONAL_ID_RE.is_match(self.national_id.trim()) {
            return Err(AppError::field(
                "national_id",
                "format",
                "National ID must be 4-32 letters or digits",
            ));
        }
        if let Some(dob) = self.date_of_birth {
            if dob > Utc::now().date_naive() {
                return Err(AppError::field(
                    "date_of_birth",
                    "future_date",
                    "Date of birth cannot be in the future",
                ));
            }
        }
        if let Some(gender) = self.gender.as_deref() {
            if !matches!(gender, "M" | "F") {
                return Err(AppError::field("gender", "invalid", "Gender must be M or F"));
            }
        }
        Ok(())
    }
}

/// Filters, sort and paging for [`ParticipantService::list`].
#[derive(Debug, Clone)]
pub struct ListParticipantsQuery {
    pub status: Option<ParticipantStatus>,
    pub search: Option<String>,
    pub sort: ParticipantSort,
    pub descending: bool,
    /// 1-based page number.
    pub page: u64,
    pub per_page: u64,
}

impl Default for ListParticipantsQuery {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            sort: ParticipantSort::CreatedAt,
            descending: true,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ListParticipantsQuery {
    const fn page(&self) -> u64 {
        if self.page == 0 { 1 } else { self.page }
    }

    fn per_page(&self) -> u64 {
        match self.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// A participant with all of its live child records.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantDetail {
    pub participant: participant::Model,
    pub identities: Vec<participant_identity::Model>,
    pub addresses: Vec<participant_address::Model>,
    pub bank_accounts: Vec<participant_bank_account::Model>,
    pub family_members: Vec<participant_family_member::Model>,
    pub employment: Option<participant_employment::Model>,
    pub pension: Option<participant_pension::Model>,
    pub beneficiaries: Vec<participant_beneficiary::Model>,
}

/// A new draft participant.
pub(crate) struct NewDraft<'a> {
    pub scope: &'a TenantScope,
    pub actor_id: &'a str,
    pub owner_id: Option<&'a str>,
    pub data: &'a PersonalDataInput,
    pub steps: StepsCompleted,
}

/// Insert a draft participant and its creation history entry.
pub(crate) async fn insert_draft<C: ConnectionTrait>(
    conn: &C,
    id_gen: &IdGenerator,
    draft: NewDraft<'_>,
) -> AppResult<participant::Model> {
    let now = Utc::now();
    let data = draft.data;
    let model = participant::ActiveModel {
        id: Set(id_gen.generate()),
        tenant_id: Set(draft.scope.tenant_id.clone()),
        product_id: Set(draft.scope.product_id.clone()),
        user_id: Set(draft.owner_id.map(ToString::to_string)),
        full_name: Set(data.full_name.trim().to_string()),
        national_id: Set(data.national_id.trim().to_string()),
        date_of_birth: Set(data.date_of_birth),
        gender: Set(data.gender.clone()),
        employee_number: Set(data.employee_number.clone()),
        phone_number: Set(data.phone_number.clone()),
        email: Set(data.email.clone()),
        status: Set(ParticipantStatus::Draft),
        steps_completed: Set(draft.steps),
        rejection_reason: Set(None),
        version: Set(1),
        record_state: Set(RecordState::Active),
        created_by: Set(draft.actor_id.to_string()),
        submitted_by: Set(None),
        submitted_at: Set(None),
        approved_by: Set(None),
        approved_at: Set(None),
        rejected_by: Set(None),
        rejected_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        deleted_at: Set(None),
    };

    let created = ParticipantRepository::new().insert(conn, model).await?;

    StatusHistoryRepository::new()
        .append(
            conn,
            NewHistoryEntry {
                participant: &created,
                event: HistoryEvent::Created,
                from_status: None,
                actor_id: draft.actor_id,
                reason: None,
            },
        )
        .await?;

    Ok(created)
}

/// Participant aggregate service.
#[derive(Clone)]
pub struct ParticipantService {
    tx: TransactionManager,
    participants: ParticipantRepository,
    history: StatusHistoryRepository,
    guard: EditableStateGuard,
    files: FileLifecycleService,
    masterdata: Option<Arc<dyn MasterdataValidator>>,
    id_gen: IdGenerator,
}

impl ParticipantService {
    #[must_use]
    pub fn new(tx: TransactionManager, files: FileLifecycleService) -> Self {
        Self {
            tx,
            participants: ParticipantRepository::new(),
            history: StatusHistoryRepository::new(),
            guard: EditableStateGuard::new(),
            files,
            masterdata: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Validate code fields against masterdata.
    #[must_use]
    pub fn with_masterdata(mut self, masterdata: Arc<dyn MasterdataValidator>) -> Self {
        self.masterdata = Some(masterdata);
        self
    }

    /// Create a draft participant (back office).
    pub async fn create(
        &self,
        scope: &TenantScope,
        actor_id: &str,
        input: PersonalDataInput,
    ) -> AppResult<participant::Model> {
        let txn = self.tx.begin().await?;
        let created = self.create_in(&txn, scope, actor_id, &input).await?;
        self.tx.commit(txn).await?;
        Ok(created)
    }

    pub async fn create_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        actor_id: &str,
        input: &PersonalDataInput,
    ) -> AppResult<participant::Model> {
        input.check()?;

        let created = insert_draft(
            conn,
            &self.id_gen,
            NewDraft {
                scope,
                actor_id,
                owner_id: None,
                data: input,
                steps: StepsCompleted::default().with(Step::PersonalData),
            },
        )
        .await?;

        info!(participant_id = %created.id, tenant_id = %scope.tenant_id, "Participant created");
        Ok(created)
    }

    /// Get a participant with all live child records.
    pub async fn get(&self, scope: &TenantScope, id: &str) -> AppResult<ParticipantDetail> {
        let conn = self.tx.connection();
        let participant = self.participants.get(conn, scope, id).await?;

        Ok(ParticipantDetail {
            identities: ChildRepository::<ParticipantIdentity>::new()
                .list(conn, scope, id)
                .await?,
            addresses: ChildRepository::<ParticipantAddress>::new()
                .list(conn, scope, id)
                .await?,
            bank_accounts: ChildRepository::<ParticipantBankAccount>::new()
                .list(conn, scope, id)
                .await?,
            family_members: ChildRepository::<ParticipantFamilyMember>::new()
                .list(conn, scope, id)
                .await?,
            employment: ChildRepository::<ParticipantEmployment>::new()
                .find_single(conn, scope, id)
                .await?,
            pension: ChildRepository::<ParticipantPension>::new()
                .find_single(conn, scope, id)
                .await?,
            beneficiaries: ChildRepository::<ParticipantBeneficiary>::new()
                .list(conn, scope, id)
                .await?,
            participant,
        })
    }

    /// List participants.
    pub async fn list(
        &self,
        scope: &TenantScope,
        query: ListParticipantsQuery,
    ) -> AppResult<Page<participant::Model>> {
        let page = query.page();
        let per_page = query.per_page();
        let filter = ParticipantFilter {
            status: query.status,
            search: query.search,
            sort: query.sort,
            order: if query.descending { Order::Desc } else { Order::Asc },
        };

        let (items, total) = self
            .participants
            .list(self.tx.connection(), scope, &filter, page - 1, per_page)
            .await?;

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Update identity and contact data.
    pub async fn update_personal_data(
        &self,
        scope: &TenantScope,
        id: &str,
        expected_version: i32,
        input: PersonalDataInput,
    ) -> AppResult<participant::Model> {
        let txn = self.tx.begin().await?;
        let updated = self
            .update_personal_data_in(&txn, scope, id, expected_version, &input)
            .await?;
        self.tx.commit(txn).await?;
        Ok(updated)
    }

    pub async fn update_personal_data_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        id: &str,
        expected_version: i32,
        input: &PersonalDataInput,
    ) -> AppResult<participant::Model> {
        input.check()?;
        let participant = self
            .guard
            .load(conn, scope, id, "edit personal data")
            .await?;

        let changes = participant::ActiveModel {
            full_name: Set(input.full_name.trim().to_string()),
            national_id: Set(input.national_id.trim().to_string()),
            date_of_birth: Set(input.date_of_birth),
            gender: Set(input.gender.clone()),
            employee_number: Set(input.employee_number.clone()),
            phone_number: Set(input.phone_number.clone()),
            email: Set(input.email.clone()),
            steps_completed: Set(participant.steps_completed.with(Step::PersonalData)),
            ..Default::default()
        };

        self.participants
            .update(conn, scope, id, expected_version, changes)
            .await
    }

    /// Status history, oldest first.
    pub async fn get_status_history(
        &self,
        scope: &TenantScope,
        id: &str,
    ) -> AppResult<Vec<participant_status_history::Model>> {
        let conn = self.tx.connection();
        self.participants.get(conn, scope, id).await?;
        self.history.list(conn, scope, id).await
    }

    async fn check_codes(&self, scope: &TenantScope, fields: Vec<CodeField<'_>>) -> AppResult<()> {
        let Some(masterdata) = self.masterdata.as_ref() else {
            return Ok(());
        };

        let mut failures = Vec::new();
        for field in fields {
            let check = masterdata
                .validate_item_code(field.category, field.code, scope)
                .await?;
            if !check.valid {
                let message = check.message.unwrap_or_else(|| {
                    format!("Unknown {} code {}", field.category, field.code)
                });
                failures.push((field.field, message));
            }
        }
        code_errors(failures)
    }

    /// Mark a data-entry step done the first time it completes.
    ///
    /// `participant` must have been loaded under the row lock. The root
    /// version stays as the caller last read it.
    async fn mark_step_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant: &participant::Model,
        step: Step,
    ) -> AppResult<()> {
        if participant.steps_completed.is_done(step) {
            return Ok(());
        }

        self.participants
            .set_steps(
                conn,
                scope,
                &participant.id,
                participant.version,
                participant.steps_completed.with(step),
            )
            .await?;
        debug!(participant_id = %participant.id, ?step, "Step completed");
        Ok(())
    }

    /// Create or update one child row.
    pub async fn save_child<I>(
        &self,
        scope: &TenantScope,
        participant_id: &str,
        input: &I,
    ) -> AppResult<<I::Entity as EntityTrait>::Model>
    where
        I: ChildInput,
        ChildActiveModel<I>: ActiveModelTrait<Entity = I::Entity>,
        <I::Entity as EntityTrait>::Model: IntoActiveModel<ChildActiveModel<I>>,
    {
        let txn = self.tx.begin().await?;
        let saved = self.save_child_in(&txn, scope, participant_id, input).await?;
        self.tx.commit(txn).await?;
        Ok(saved)
    }

    pub async fn save_child_in<I, C>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        input: &I,
    ) -> AppResult<<I::Entity as EntityTrait>::Model>
    where
        I: ChildInput,
        C: ConnectionTrait,
        ChildActiveModel<I>: ActiveModelTrait<Entity = I::Entity>,
        <I::Entity as EntityTrait>::Model: IntoActiveModel<ChildActiveModel<I>>,
    {
        validate_input(input)?;
        let participant = self
            .guard
            .load(conn, scope, participant_id, edit_action::<I::Entity>("edit"))
            .await?;
        self.check_codes(scope, input.code_fields()).await?;

        let repo = ChildRepository::<I::Entity>::new();
        if input.checks_siblings() {
            let siblings = repo.list(conn, scope, participant_id).await?;
            input.check_siblings(&siblings)?;
        }
        let saved = match input.id() {
            None => {
                if I::SINGLE {
                    if let Some(existing) = repo.find_single(conn, scope, participant_id).await? {
                        return Err(AppError::Conflict(format!(
                            "{} {} already exists; update it instead",
                            I::Entity::LABEL,
                            I::Entity::id_of(&existing)
                        )));
                    }
                }
                let row = new_row(
                    input,
                    self.id_gen.generate(),
                    scope,
                    participant_id,
                    Utc::now().into(),
                );
                repo.insert(conn, row).await?
            }
            Some(id) => {
                let version = required_version(input.version())?;
                repo.get_owned(conn, scope, participant_id, id).await?;
                repo.update(conn, scope, id, version, input.changes())
                    .await?
            }
        };

        if let Some(file_id) = input.file_id() {
            self.files
                .promote_in(conn, scope, participant_id, file_id)
                .await?;
        }
        self.mark_step_in(conn, scope, &participant, I::STEP).await?;

        debug!(
            participant_id = %participant_id,
            entity = I::Entity::LABEL,
            id = %I::Entity::id_of(&saved),
            "Child record saved"
        );
        Ok(saved)
    }

    /// Soft-delete one child row.
    pub async fn delete_child<E>(
        &self,
        scope: &TenantScope,
        participant_id: &str,
        id: &str,
        expected_version: i32,
    ) -> AppResult<E::Model>
    where
        E: ChildEntity,
        E::ActiveModel: ActiveModelTrait<Entity = E>,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        let txn = self.tx.begin().await?;
        let deleted = self
            .delete_child_in::<E, _>(&txn, scope, participant_id, id, expected_version)
            .await?;
        self.tx.commit(txn).await?;
        Ok(deleted)
    }

    pub async fn delete_child_in<E, C>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        id: &str,
        expected_version: i32,
    ) -> AppResult<E::Model>
    where
        E: ChildEntity,
        C: ConnectionTrait,
        E::ActiveModel: ActiveModelTrait<Entity = E>,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        self.guard
            .load(conn, scope, participant_id, edit_action::<E>("delete"))
            .await?;

        let repo = ChildRepository::<E>::new();
        repo.get_owned(conn, scope, participant_id, id).await?;
        let deleted = repo.soft_delete(conn, scope, id, expected_version).await?;

        debug!(participant_id = %participant_id, entity = E::LABEL, id = %id, "Child record deleted");
        Ok(deleted)
    }

    /// Replace the whole collection of a child type.
    ///
    /// Live rows missing from `inputs` are soft-deleted, inputs carrying an
    /// id and version update their row, and the rest are inserted.
    pub async fn replace_children<I>(
        &self,
        scope: &TenantScope,
        participant_id: &str,
        inputs: &[I],
    ) -> AppResult<Vec<<I::Entity as EntityTrait>::Model>>
    where
        I: ChildInput,
        ChildActiveModel<I>: ActiveModelTrait<Entity = I::Entity>,
        <I::Entity as EntityTrait>::Model: IntoActiveModel<ChildActiveModel<I>>,
    {
        let txn = self.tx.begin().await?;
        let saved = self
            .replace_children_in(&txn, scope, participant_id, inputs)
            .await?;
        self.tx.commit(txn).await?;
        Ok(saved)
    }

    pub async fn replace_children_in<I, C>(
        &self,
        conn: &C,
        scope: &TenantScope,
        participant_id: &str,
        inputs: &[I],
    ) -> AppResult<Vec<<I::Entity as EntityTrait>::Model>>
    where
        I: ChildInput,
        C: ConnectionTrait,
        ChildActiveModel<I>: ActiveModelTrait<Entity = I::Entity>,
        <I::Entity as EntityTrait>::Model: IntoActiveModel<ChildActiveModel<I>>,
    {
        for input in inputs {
            validate_input(input)?;
        }
        I::check_collection(inputs)?;

        let participant = self
            .guard
            .load(conn, scope, participant_id, edit_action::<I::Entity>("replace"))
            .await?;
        self.check_codes(scope, inputs.iter().flat_map(|input| input.code_fields()).collect())
            .await?;

        let repo = ChildRepository::<I::Entity>::new();
        let existing = repo.list(conn, scope, participant_id).await?;
        let kept: HashSet<&str> = inputs.iter().filter_map(|input| input.id()).collect();

        for row in &existing {
            let id = I::Entity::id_of(row);
            if !kept.contains(id) {
                repo.soft_delete(conn, scope, id, I::Entity::version_of(row))
                    .await?;
            }
        }

        let now = Utc::now();
        let mut saved = Vec::with_capacity(inputs.len());
        for input in inputs {
            let row = match input.id() {
                Some(id) => {
                    if !existing.iter().any(|row| I::Entity::id_of(row) == id) {
                        return Err(AppError::NotFound(format!("{} {id}", I::Entity::LABEL)));
                    }
                    let version = required_version(input.version())?;
                    repo.update(conn, scope, id, version, input.changes())
                        .await?
                }
                None => {
                    let row = new_row(input, self.id_gen.generate(), scope, participant_id, now.into());
                    repo.insert(conn, row).await?
                }
            };
            if let Some(file_id) = input.file_id() {
                self.files
                    .promote_in(conn, scope, participant_id, file_id)
                    .await?;
            }
            saved.push(row);
        }

        if !inputs.is_empty() {
            self.mark_step_in(conn, scope, &participant, I::STEP).await?;
        }

        debug!(
            participant_id = %participant_id,
            entity = I::Entity::LABEL,
            count = saved.len(),
            "Child records replaced"
        );
        Ok(saved)
    }
}

fn edit_action<E: VersionedEntity>(verb: &str) -> String {
    format!("{verb} {}", E::LABEL.to_lowercase())
}

fn required_version(version: Option<i32>) -> AppResult<i32> {
    version.ok_or_else(|| {
        AppError::field(
            "version",
            "required",
            "The version you last read is required when updating",
        )
    })
}

macro_rules! child_operations {
    (
        $input:ty, $entity:ty, $model:ty,
        save: $save:ident, delete: $delete:ident $(, replace: $replace:ident)?
    ) => {
        impl ParticipantService {
            pub async fn $save(
                &self,
                scope: &TenantScope,
                participant_id: &str,
                input: $input,
            ) -> AppResult<$model> {
                self.save_child(scope, participant_id, &input).await
            }

            pub async fn $delete(
                &self,
                scope: &TenantScope,
                participant_id: &str,
                id: &str,
                expected_version: i32,
            ) -> AppResult<$model> {
                self.delete_child::<$entity>(scope, participant_id, id, expected_version)
                    .await
            }

            $(
                pub async fn $replace(
                    &self,
                    scope: &TenantScope,
                    participant_id: &str,
                    inputs: Vec<$input>,
                ) -> AppResult<Vec<$model>> {
                    self.replace_children(scope, participant_id, &inputs).await
                }
            )?
        }
    };
}

child_operations!(
    IdentityInput,
    ParticipantIdentity,
    participant_identity::Model,
    save: save_identity,
    delete: delete_identity,
    replace: replace_identities
);
child_operations!(
    AddressInput,
    ParticipantAddress,
    participant_address::Model,
    save: save_address,
    delete: delete_address,
    replace: replace_addresses
);
child_operations!(
    BankAccountInput,
    ParticipantBankAccount,
    participant_bank_account::Model,
    save: save_bank_account,
    delete: delete_bank_account,
    replace: replace_bank_accounts
);
child_operations!(
    FamilyMemberInput,
    ParticipantFamilyMember,
    participant_family_member::Model,
    save: save_family_member,
    delete: delete_family_member,
    replace: replace_family_members
);
child_operations!(
    EmploymentInput,
    ParticipantEmployment,
    participant_employment::Model,
    save: save_employment,
    delete: delete_employment
);
child_operations!(
    PensionInput,
    ParticipantPension,
    participant_pension::Model,
    save: save_pension,
    delete: delete_pension
);
child_operations!(
    BeneficiaryInput,
    ParticipantBeneficiary,
    participant_beneficiary::Model,
    save: save_beneficiary,
    delete: delete_beneficiary,
    replace: replace_beneficiaries
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStorage, StaticMasterdata};
    use enrollment_common::config::FileSettings;
    use enrollment_db::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};

    fn service(db: DatabaseConnection) -> ParticipantService {
        let tx = TransactionManager::new(Arc::new(db));
        let files = FileLifecycleService::new(
            tx.clone(),
            MemoryStorage::shared(),
            "enrollment-documents",
            FileSettings::default(),
        );
        ParticipantService::new(tx, files)
    }

    fn personal_data() -> PersonalDataInput {
        PersonalDataInput {
            full_name: "Siti Rahmawati".to_string(),
            national_id: "3174055501900001".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 15),
            gender: Some("F".to_string()),
            employee_number: Some("EMP-0001".to_string()),
            phone_number: None,
            email: Some("siti@example.com".to_string()),
        }
    }

    fn address_input() -> AddressInput {
        AddressInput {
            id: None,
            version: None,
            address_type: "HOME".to_string(),
            street: "Jl. Merdeka 1".to_string(),
            city: "Jakarta".to_string(),
            province: "DKI Jakarta".to_string(),
            postal_code: Some("10110".to_string()),
            country_code: "ID".to_string(),
        }
    }

    fn draft() -> participant::Model {
        fixtures::participant("p1", ParticipantStatus::Draft)
    }

    fn marked() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    #[tokio::test]
    async fn test_create_writes_draft_and_history() {
        let mut created = draft();
        created.steps_completed = StepsCompleted::default().with(Step::PersonalData);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[created.clone()]])
            .append_query_results([[fixtures::history(
                "h1",
                &created,
                HistoryEvent::Created,
                None,
            )]])
            .into_connection();

        let result = service(db)
            .create(&fixtures::scope(), "admin", personal_data())
            .await
            .unwrap();

        assert_eq!(result.status, ParticipantStatus::Draft);
        assert_eq!(result.version, 1);
        assert!(result.steps_completed.is_done(Step::PersonalData));
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_national_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let mut input = personal_data();
        input.national_id = "31-74".to_string();
        let result = service(db).create(&fixtures::scope(), "admin", input).await;

        match result {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("national_id"));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_address_save_marks_step() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft()]])
            .append_query_results([[fixtures::address("a1", "p1")]])
            .append_exec_results([marked()])
            .into_connection();

        let saved = service(db)
            .save_address(&fixtures::scope(), "p1", address_input())
            .await
            .unwrap();

        assert_eq!(saved.id, "a1");
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn test_child_save_keeps_root_version_for_submit() {
        let scope = fixtures::scope();
        let mut created = draft();
        created.steps_completed = StepsCompleted::default().with(Step::PersonalData);
        let mut with_address = created.clone();
        with_address.steps_completed = created.steps_completed.with(Step::Address);
        let mut submitted = with_address.clone();
        submitted.status = ParticipantStatus::PendingApproval;
        submitted.version = 2;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // create
                .append_query_results([[created.clone()]])
                .append_query_results([[fixtures::history("h1", &created, HistoryEvent::Created, None)]])
                // save address
                .append_query_results([[created.clone()]])
                .append_query_results([[fixtures::address("a1", "p1")]])
                .append_exec_results([marked()])
                // submit
                .append_query_results([[with_address]])
                .append_query_results([[submitted.clone()]])
                .append_query_results([[fixtures::history(
                    "h2",
                    &submitted,
                    HistoryEvent::Submitted,
                    Some(ParticipantStatus::Draft),
                )]])
                .into_connection(),
        );
        let tx = TransactionManager::new(db.clone());
        let files = FileLifecycleService::new(
            tx.clone(),
            MemoryStorage::shared(),
            "enrollment-documents",
            FileSettings::default(),
        );
        let participants = ParticipantService::new(tx.clone(), files);
        let workflow = crate::services::WorkflowService::new(tx);

        let participant = participants
            .create(&scope, "admin", personal_data())
            .await
            .unwrap();
        participants
            .save_address(&scope, &participant.id, address_input())
            .await
            .unwrap();
        let result = workflow
            .submit(&scope, &participant.id, participant.version, "admin")
            .await
            .unwrap();
        assert_eq!(result.status, ParticipantStatus::PendingApproval);

        drop((participants, workflow));
        let bumps = Arc::try_unwrap(db)
            .unwrap()
            .into_transaction_log()
            .iter()
            .flat_map(|txn| txn.statements().iter())
            .filter(|stmt| stmt.sql.contains("\"version\" + "))
            .count();
        // Only the submit advances the root.
        assert_eq!(bumps, 1);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_is_conflict() {
        let mut input = address_input();
        input.id = Some("a1".to_string());
        input.version = Some(1);
        input.city = "Bandung".to_string();

        let mut current = draft();
        current.steps_completed = StepsCompleted::default().with(Step::Address);
        let mut stored = fixtures::address("a1", "p1");
        stored.version = 2;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[current]])
            .append_query_results([[stored]])
            .append_query_results([Vec::<participant_address::Model>::new()])
            .into_connection();

        let result = service(db)
            .save_address(&fixtures::scope(), "p1", input)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_without_version_is_rejected() {
        let mut input = address_input();
        input.id = Some("a1".to_string());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft()]])
            .into_connection();

        let result = service(db)
            .save_address(&fixtures::scope(), "p1", input)
            .await;

        match result {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("version"));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_on_approved_participant_is_invalid_state() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::participant("p1", ParticipantStatus::Approved)]])
            .into_connection();
        let svc = service(db);

        let result = svc
            .delete_address(&fixtures::scope(), "p1", "a1", 1)
            .await;

        match result {
            Err(AppError::InvalidState { action, status }) => {
                assert_eq!(action, "delete address");
                assert_eq!(status, "APPROVED");
            }
            other => panic!("Expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_masterdata_code_blocks_write() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft()]])
            .into_connection();
        let svc = service(db).with_masterdata(Arc::new(StaticMasterdata::rejecting(
            crate::services::collaborators::categories::COUNTRY,
            "XX",
        )));

        let mut input = address_input();
        input.country_code = "XX".to_string();
        let result = svc.save_address(&fixtures::scope(), "p1", input).await;

        match result {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("country_code"));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_primary_bank_account_is_rejected() {
        let mut existing = fixtures::bank_account("b1", "p1");
        existing.is_primary = true;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft()]])
            .append_query_results([[existing]])
            .into_connection();

        let input = BankAccountInput {
            id: None,
            version: None,
            bank_code: "BNI".to_string(),
            account_number: "99887766".to_string(),
            account_holder_name: "Siti Rahmawati".to_string(),
            currency_code: "IDR".to_string(),
            is_primary: true,
            file_id: None,
        };
        let result = service(db)
            .save_bank_account(&fixtures::scope(), "p1", input)
            .await;

        match result {
            Err(AppError::Validation(errors)) => {
                assert!(errors.field_errors().contains_key("is_primary"));
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_employment_is_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft()]])
            .append_query_results([[fixtures::employment("e1", "p1")]])
            .into_connection();

        let input = EmploymentInput {
            id: None,
            version: None,
            employer_name: "PT Maju".to_string(),
            occupation_code: "ENG".to_string(),
            position: None,
            employment_status: "PERMANENT".to_string(),
            income_range_code: None,
            start_date: NaiveDate::from_ymd_opt(2015, 3, 1),
        };
        let result = service(db)
            .save_employment(&fixtures::scope(), "p1", input)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_replace_beneficiaries_removes_missing_rows() {
        let mut removed = fixtures::beneficiary("b2", "p1", 40);
        removed.record_state = RecordState::Deleted;
        removed.version = 2;
        let mut kept = fixtures::beneficiary("b1", "p1", 100);
        kept.version = 2;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[draft()]])
            .append_query_results([[
                fixtures::beneficiary("b1", "p1", 60),
                fixtures::beneficiary("b2", "p1", 40),
            ]])
            .append_query_results([[removed]])
            .append_query_results([[kept]])
            .append_exec_results([marked()])
            .into_connection();

        let inputs = vec![BeneficiaryInput {
            id: Some("b1".to_string()),
            version: Some(1),
            full_name: "Budi Santoso".to_string(),
            relationship: "SPOUSE".to_string(),
            national_id: None,
            allocation_percent: 100,
            file_id: None,
        }];
        let saved = service(db)
            .replace_beneficiaries(&fixtures::scope(), "p1", inputs)
            .await
            .unwrap();

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].allocation_percent, 100);
    }

    #[tokio::test]
    async fn test_replace_with_bad_allocation_touches_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let inputs = vec![BeneficiaryInput {
            id: None,
            version: None,
            full_name: "Budi Santoso".to_string(),
            relationship: "SPOUSE".to_string(),
            national_id: None,
            allocation_percent: 70,
            file_id: None,
        }];
        let result = service(db)
            .replace_beneficiaries(&fixtures::scope(), "p1", inputs)
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_list_query_paging_bounds() {
        let query = ListParticipantsQuery {
            page: 0,
            per_page: 500,
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), MAX_PER_PAGE);

        let query = ListParticipantsQuery {
            per_page: 0,
            ..Default::default()
        };
        assert_eq!(query.per_page(), DEFAULT_PER_PAGE);
        assert!(query.descending);
    }
}
