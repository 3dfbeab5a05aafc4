//! Create `participant_registration` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ParticipantRegistration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ParticipantRegistration::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::TenantId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::ProductId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::ParticipantId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::OrganizationCode)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::IsLinked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(ParticipantRegistration::ReviewedBy).string_len(64))
                    .col(
                        ColumnDef::new(ParticipantRegistration::ReviewedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(ParticipantRegistration::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_participant")
                            .from(
                                ParticipantRegistration::Table,
                                ParticipantRegistration::ParticipantId,
                            )
                            .to(Participant::Table, Participant::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_registration_scope_status")
                    .table(ParticipantRegistration::Table)
                    .col(ParticipantRegistration::TenantId)
                    .col(ParticipantRegistration::ProductId)
                    .col(ParticipantRegistration::Status)
                    .to_owned(),
            )
            .await?;

        // One pending registration per participant.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_registration_pending_unique \
                 ON participant_registration (participant_id) WHERE status = 'pending'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ParticipantRegistration::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ParticipantRegistration {
    Table,
    Id,
    TenantId,
    ProductId,
    ParticipantId,
    UserId,
    OrganizationCode,
    IsLinked,
    Status,
    ReviewedBy,
    ReviewedAt,
    CreatedAt,
}

#[derive(Iden)]
enum Participant {
    Table,
    Id,
}
