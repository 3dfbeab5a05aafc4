//! Create `participant_status_history` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ParticipantStatusHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::TenantId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::ProductId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::ParticipantId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::Event)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ParticipantStatusHistory::FromStatus).string_len(32))
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::ToStatus)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::ActorId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ParticipantStatusHistory::Reason).text())
                    .col(
                        ColumnDef::new(ParticipantStatusHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_status_history_participant")
                            .from(
                                ParticipantStatusHistory::Table,
                                ParticipantStatusHistory::ParticipantId,
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
                    .name("idx_status_history_participant_created")
                    .table(ParticipantStatusHistory::Table)
                    .col(ParticipantStatusHistory::ParticipantId)
                    .col(ParticipantStatusHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // The audit trail is append-only.
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE OR REPLACE FUNCTION participant_status_history_immutable()
                RETURNS trigger AS $$
                BEGIN
                    RAISE EXCEPTION 'participant_status_history is append-only';
                END;
                $$ LANGUAGE plpgsql;

                CREATE TRIGGER trg_participant_status_history_immutable
                BEFORE UPDATE OR DELETE ON participant_status_history
                FOR EACH ROW EXECUTE FUNCTION participant_status_history_immutable();
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ParticipantStatusHistory::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .get_connection()
            .execute_unprepared("DROP FUNCTION IF EXISTS participant_status_history_immutable()")
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum ParticipantStatusHistory {
    Table,
    Id,
    TenantId,
    ProductId,
    ParticipantId,
    Event,
    FromStatus,
    ToStatus,
    ActorId,
    Reason,
    CreatedAt,
}

#[derive(Iden)]
enum Participant {
    Table,
    Id,
}
