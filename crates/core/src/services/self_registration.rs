//! Self-registration of authenticated users.
//!
//! A user presents a national ID and a participant number. If the back
//! office already imported a matching participant with no owner, the user is
//! linked to it; if nothing matches, a new draft is created from the user's
//! profile. A match that already has an owner is a conflict whoever asks.

use std::sync::Arc;

use chrono::Utc;
use enrollment_common::{AppError, AppResult, IdGenerator, TenantScope};
use enrollment_db::{
    entities::{
        ParticipantPension, participant,
        participant::{Step, StepsCompleted},
        participant_registration::{self, RegistrationStatus},
        participant_status_history::HistoryEvent,
    },
    repositories::{
        ChildRepository, ParticipantRepository, RegistrationRepository, StatusHistoryRepository,
        status_history::NewHistoryEntry,
    },
};
use sea_orm::{ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::child::{PensionInput, new_row};
use super::collaborators::{
    MasterdataValidator, ProductReader, TenantReader, UserProfile, UserProfileReader, categories,
};
use super::participant::{NewDraft, PersonalDataInput, insert_draft};
use super::transaction::TransactionManager;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SelfRegistrationInput {
    #[validate(length(min = 1, max = 64))]
    pub tenant_code: String,
    #[validate(length(min = 1, max = 64))]
    pub product_code: String,
    #[validate(length(min = 4, max = 32))]
    pub national_id: String,
    #[validate(length(min = 1, max = 64))]
    pub participant_number: String,
    #[validate(length(min = 1, max = 32))]
    pub organization_code: String,
}

/// What a registration produced.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub participant: participant::Model,
    pub registration: participant_registration::Model,
    /// `true` when an imported record was linked rather than a new one created.
    pub is_linked: bool,
}

/// Self-registration service.
#[derive(Clone)]
pub struct SelfRegistrationService {
    tx: TransactionManager,
    participants: ParticipantRepository,
    pensions: ChildRepository<ParticipantPension>,
    history: StatusHistoryRepository,
    registrations: RegistrationRepository,
    masterdata: Arc<dyn MasterdataValidator>,
    profiles: Arc<dyn UserProfileReader>,
    tenants: Arc<dyn TenantReader>,
    products: Arc<dyn ProductReader>,
    id_gen: IdGenerator,
}

impl SelfRegistrationService {
    #[must_use]
    pub fn new(
        tx: TransactionManager,
        masterdata: Arc<dyn MasterdataValidator>,
        profiles: Arc<dyn UserProfileReader>,
        tenants: Arc<dyn TenantReader>,
        products: Arc<dyn ProductReader>,
    ) -> Self {
        Self {
            tx,
            participants: ParticipantRepository::new(),
            pensions: ChildRepository::new(),
            history: StatusHistoryRepository::new(),
            registrations: RegistrationRepository::new(),
            masterdata,
            profiles,
            tenants,
            products,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register `user_id` as a participant.
    pub async fn register(
        &self,
        user_id: &str,
        input: SelfRegistrationInput,
    ) -> AppResult<RegistrationOutcome> {
        input.validate()?;
        let scope = self.resolve_scope(&input).await?;

        let organization = self
            .masterdata
            .validate_item_code(categories::ORGANIZATION, &input.organization_code, &scope)
            .await?;
        if !organization.valid {
            return Err(AppError::field(
                "organization_code",
                "masterdata",
                organization.message.unwrap_or_else(|| {
                    format!("Unknown organization code {}", input.organization_code)
                }),
            ));
        }

        let txn = self.tx.begin().await?;
        let outcome = self.register_in(&txn, &scope, user_id, &input).await?;
        self.tx.commit(txn).await?;

        info!(
            participant_id = %outcome.participant.id,
            tenant_id = %scope.tenant_id,
            user_id = %user_id,
            is_linked = outcome.is_linked,
            "Self-registration completed"
        );
        Ok(outcome)
    }

    async fn resolve_scope(&self, input: &SelfRegistrationInput) -> AppResult<TenantScope> {
        let tenant = self
            .tenants
            .find_by_code(&input.tenant_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tenant {}", input.tenant_code)))?;
        if !tenant.is_active {
            return Err(AppError::Unprocessable(format!(
                "Tenant {} is not active",
                tenant.code
            )));
        }

        let product = self
            .products
            .find_by_code(&tenant.id, &input.product_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", input.product_code)))?;
        if !product.self_registration_enabled {
            return Err(AppError::Unprocessable(format!(
                "Self-registration is disabled for product {}",
                product.code
            )));
        }

        Ok(TenantScope::new(tenant.id, product.id))
    }

    /// Run the lookup and the link or create branch on `conn`.
    pub async fn register_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        user_id: &str,
        input: &SelfRegistrationInput,
    ) -> AppResult<RegistrationOutcome> {
        let national_id = input.national_id.trim();
        let participant_number = input.participant_number.trim();

        let existing = self
            .participants
            .find_by_identity(conn, scope, national_id, participant_number)
            .await?;

        if existing.as_ref().is_some_and(|p| p.user_id.is_some()) {
            return Err(AppError::Conflict(
                "A participant with these identifiers is already registered".to_string(),
            ));
        }
        if self
            .participants
            .find_by_user(conn, scope, user_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "This user is already registered as a participant".to_string(),
            ));
        }

        let (participant, is_linked) = match existing {
            Some(found) => (self.link(conn, scope, user_id, &found).await?, true),
            None => (
                self.create(conn, scope, user_id, national_id, participant_number)
                    .await?,
                false,
            ),
        };

        let registration = self
            .registrations
            .insert(
                conn,
                participant_registration::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    tenant_id: Set(scope.tenant_id.clone()),
                    product_id: Set(scope.product_id.clone()),
                    participant_id: Set(participant.id.clone()),
                    user_id: Set(user_id.to_string()),
                    organization_code: Set(input.organization_code.clone()),
                    is_linked: Set(is_linked),
                    status: Set(RegistrationStatus::Pending),
                    reviewed_by: Set(None),
                    reviewed_at: Set(None),
                    created_at: Set(Utc::now().into()),
                },
            )
            .await?;

        Ok(RegistrationOutcome {
            participant,
            registration,
            is_linked,
        })
    }

    async fn link<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        user_id: &str,
        found: &participant::Model,
    ) -> AppResult<participant::Model> {
        let linked = self
            .participants
            .link_user(conn, scope, &found.id, found.version, user_id)
            .await?;

        self.history
            .append(
                conn,
                NewHistoryEntry {
                    participant: &linked,
                    event: HistoryEvent::Linked,
                    from_status: Some(found.status),
                    actor_id: user_id,
                    reason: None,
                },
            )
            .await?;

        Ok(linked)
    }

    async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        user_id: &str,
        national_id: &str,
        participant_number: &str,
    ) -> AppResult<participant::Model> {
        let profile = self
            .profiles
            .get_by_user_id(user_id)
            .await?
            .filter(UserProfile::is_complete)
            .ok_or_else(|| {
                AppError::Unprocessable(
                    "Complete your profile (name, date of birth, gender) before registering"
                        .to_string(),
                )
            })?;

        let data = PersonalDataInput {
            full_name: profile.full_name.unwrap_or_default(),
            national_id: national_id.to_string(),
            date_of_birth: profile.date_of_birth,
            gender: profile.gender,
            employee_number: None,
            phone_number: profile.phone_number,
            email: profile.email,
        };
        data.check()?;

        let created = insert_draft(
            conn,
            &self.id_gen,
            NewDraft {
                scope,
                actor_id: user_id,
                owner_id: Some(user_id),
                data: &data,
                steps: StepsCompleted::default()
                    .with(Step::PersonalData)
                    .with(Step::Pension),
            },
        )
        .await?;

        let pension = PensionInput {
            id: None,
            version: None,
            participant_number: participant_number.to_string(),
            program_code: None,
            effective_date: None,
            retirement_age: None,
        };
        self.pensions
            .insert(
                conn,
                new_row(
                    &pension,
                    self.id_gen.generate(),
                    scope,
                    &created.id,
                    Utc::now().into(),
                ),
            )
            .await?;

        Ok(created)
    }
}
