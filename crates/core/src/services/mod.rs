//! Business logic services.

#![allow(missing_docs)]

pub mod child;
pub mod collaborators;
pub mod file_lifecycle;
pub mod guard;
pub mod participant;
pub mod self_registration;
pub mod transaction;
pub mod workflow;

pub use child::{
    AddressInput, BankAccountInput, BeneficiaryInput, ChildInput, EmploymentInput,
    FamilyMemberInput, IdentityInput, PensionInput,
};
pub use collaborators::{
    MasterdataCheck, MasterdataValidator, ProductReader, ProductRecord, TenantReader,
    TenantRecord, UserProfile, UserProfileReader, categories,
};
pub use file_lifecycle::{FileLifecycleService, ReclaimReport, UploadInput};
pub use guard::EditableStateGuard;
pub use participant::{
    ListParticipantsQuery, Page, ParticipantDetail, ParticipantService, PersonalDataInput,
};
pub use self_registration::{RegistrationOutcome, SelfRegistrationInput, SelfRegistrationService};
pub use transaction::TransactionManager;
pub use workflow::{WorkflowAction, WorkflowService, transition};
