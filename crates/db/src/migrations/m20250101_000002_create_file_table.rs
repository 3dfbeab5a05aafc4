//! Create `file` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(File::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(File::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(File::TenantId).string_len(64).not_null())
                    .col(ColumnDef::new(File::ProductId).string_len(64).not_null())
                    .col(ColumnDef::new(File::ParticipantId).string_len(32).not_null())
                    .col(ColumnDef::new(File::FieldName).string_len(64).not_null())
                    .col(ColumnDef::new(File::UploadedBy).string_len(64).not_null())
                    .col(ColumnDef::new(File::Bucket).string_len(128).not_null())
                    .col(ColumnDef::new(File::StorageKey).string_len(512).not_null())
                    .col(ColumnDef::new(File::OriginalName).string_len(256).not_null())
                    .col(ColumnDef::new(File::ContentType).string_len(128).not_null())
                    .col(ColumnDef::new(File::Size).big_integer().not_null())
                    .col(ColumnDef::new(File::Md5).string_len(32))
                    .col(ColumnDef::new(File::ExpiresAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(File::ClaimedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(File::FailedDeleteAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(File::RecordState)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(File::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(File::DeletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Partial index backing the reclamation claim query.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_file_reclaimable ON file (expires_at) \
                 WHERE claimed_at IS NULL AND record_state = 'active' AND expires_at IS NOT NULL",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_file_claimed_at")
                    .table(File::Table)
                    .col(File::ClaimedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_file_participant")
                    .table(File::Table)
                    .col(File::TenantId)
                    .col(File::ProductId)
                    .col(File::ParticipantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(File::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum File {
    Table,
    Id,
    TenantId,
    ProductId,
    ParticipantId,
    FieldName,
    UploadedBy,
    Bucket,
    StorageKey,
    OriginalName,
    ContentType,
    Size,
    Md5,
    ExpiresAt,
    ClaimedAt,
    FailedDeleteAttempts,
    RecordState,
    CreatedAt,
    DeletedAt,
}
