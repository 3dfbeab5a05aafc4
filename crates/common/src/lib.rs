//! Common utilities and shared types for the enrollment engine.
//!
//! This crate provides foundational components used across all workspace crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Scoping**: Tenant/product isolation via [`TenantScope`]
//! - **Storage**: Blob storage backends (local, S3-compatible)
//!
//! # Example
//!
//! ```no_run
//! use enrollment_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id = IdGenerator::new().generate();
//!     println!("Generated ID {id} for bucket {}", config.storage.bucket);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod scope;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, field_error};
pub use id::IdGenerator;
pub use scope::TenantScope;
pub use storage::{LocalStorage, SharedStorage, StorageBackend, StoredObject, object_key};

#[cfg(feature = "s3")]
pub use storage::S3Storage;
