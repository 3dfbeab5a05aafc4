//! Database entities.
//!
//! One module per table. The participant is the aggregate root; the
//! `participant_*` child tables each reference exactly one participant and are
//! versioned independently.

pub mod file;
pub mod participant;
pub mod participant_address;
pub mod participant_bank_account;
pub mod participant_beneficiary;
pub mod participant_employment;
pub mod participant_family_member;
pub mod participant_identity;
pub mod participant_pension;
pub mod participant_registration;
pub mod participant_status_history;
pub mod record_state;

pub use file::Entity as File;
pub use participant::Entity as Participant;
pub use participant_address::Entity as ParticipantAddress;
pub use participant_bank_account::Entity as ParticipantBankAccount;
pub use participant_beneficiary::Entity as ParticipantBeneficiary;
pub use participant_employment::Entity as ParticipantEmployment;
pub use participant_family_member::Entity as ParticipantFamilyMember;
pub use participant_identity::Entity as ParticipantIdentity;
pub use participant_pension::Entity as ParticipantPension;
pub use participant_registration::Entity as ParticipantRegistration;
pub use participant_status_history::Entity as ParticipantStatusHistory;
pub use record_state::RecordState;
