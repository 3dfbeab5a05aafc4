//! Repository layer.
//!
//! Repositories hold no connection. Each method takes the connection or
//! transaction to run on as `&impl ConnectionTrait`, so whether a call joins
//! an open transaction is decided at the call site.

pub mod child;
pub mod file;
pub mod participant;
pub mod registration;
pub mod status_history;
pub mod versioned;

pub use child::ChildRepository;
pub use file::FileRepository;
pub use participant::{ParticipantFilter, ParticipantRepository, ParticipantSort};
pub use registration::RegistrationRepository;
pub use status_history::StatusHistoryRepository;
pub use versioned::{ChildEntity, VersionedEntity};
