//! Create `participant` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Participant::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participant::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Participant::TenantId).string_len(64).not_null())
                    .col(ColumnDef::new(Participant::ProductId).string_len(64).not_null())
                    .col(ColumnDef::new(Participant::UserId).string_len(64))
                    .col(ColumnDef::new(Participant::FullName).string_len(256).not_null())
                    .col(ColumnDef::new(Participant::NationalId).string_len(32).not_null())
                    .col(ColumnDef::new(Participant::DateOfBirth).date())
                    .col(ColumnDef::new(Participant::Gender).string_len(16))
                    .col(ColumnDef::new(Participant::EmployeeNumber).string_len(64))
                    .col(ColumnDef::new(Participant::PhoneNumber).string_len(32))
                    .col(ColumnDef::new(Participant::Email).string_len(256))
                    .col(
                        ColumnDef::new(Participant::Status)
                            .string_len(32)
                            .not_null()
                            .default("DRAFT"),
                    )
                    .col(
                        ColumnDef::new(Participant::StepsCompleted)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(ColumnDef::new(Participant::RejectionReason).text())
                    .col(
                        ColumnDef::new(Participant::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Participant::RecordState)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Participant::CreatedBy).string_len(64).not_null())
                    .col(ColumnDef::new(Participant::SubmittedBy).string_len(64))
                    .col(ColumnDef::new(Participant::SubmittedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Participant::ApprovedBy).string_len(64))
                    .col(ColumnDef::new(Participant::ApprovedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Participant::RejectedBy).string_len(64))
                    .col(ColumnDef::new(Participant::RejectedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Participant::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Participant::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Participant::DeletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index: tenant scope + status (list filters)
        manager
            .create_index(
                Index::create()
                    .name("idx_participant_scope_status")
                    .table(Participant::Table)
                    .col(Participant::TenantId)
                    .col(Participant::ProductId)
                    .col(Participant::Status)
                    .to_owned(),
            )
            .await?;

        // Index: national id lookup during self-registration
        manager
            .create_index(
                Index::create()
                    .name("idx_participant_scope_national_id")
                    .table(Participant::Table)
                    .col(Participant::TenantId)
                    .col(Participant::ProductId)
                    .col(Participant::NationalId)
                    .to_owned(),
            )
            .await?;

        // Index: owner lookup
        manager
            .create_index(
                Index::create()
                    .name("idx_participant_user_id")
                    .table(Participant::Table)
                    .col(Participant::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Participant::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Participant {
    Table,
    Id,
    TenantId,
    ProductId,
    UserId,
    FullName,
    NationalId,
    DateOfBirth,
    Gender,
    EmployeeNumber,
    PhoneNumber,
    Email,
    Status,
    StepsCompleted,
    RejectionReason,
    Version,
    RecordState,
    CreatedBy,
    SubmittedBy,
    SubmittedAt,
    ApprovedBy,
    ApprovedAt,
    RejectedBy,
    RejectedAt,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
