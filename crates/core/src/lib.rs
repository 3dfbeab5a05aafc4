//! Core business logic for the enrollment engine.
//!
//! The participant aggregate, its guards, the workflow state machine, the
//! document lifecycle and self-registration live here. Each service
//! operation comes in two forms: `op(...)` runs in its own transaction,
//! `op_in(conn, ...)` joins a transaction the caller already holds.

pub mod services;

pub use services::*;

#[cfg(test)]
pub(crate) mod testing;
