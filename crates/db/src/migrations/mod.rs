//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_participant_table;
mod m20250101_000002_create_file_table;
mod m20250101_000003_create_participant_child_tables;
mod m20250101_000004_create_status_history_table;
mod m20250101_000005_create_registration_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_participant_table::Migration),
            Box::new(m20250101_000002_create_file_table::Migration),
            Box::new(m20250101_000003_create_participant_child_tables::Migration),
            Box::new(m20250101_000004_create_status_history_table::Migration),
            Box::new(m20250101_000005_create_registration_table::Migration),
        ]
    }
}
