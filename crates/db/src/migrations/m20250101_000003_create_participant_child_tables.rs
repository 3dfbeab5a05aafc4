//! Create the participant child tables.
//!
//! Every child table shares the same scoping, versioning and liveness
//! columns; only the payload columns differ.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const CHILD_TABLES: [&str; 7] = [
    "participant_identity",
    "participant_address",
    "participant_bank_account",
    "participant_family_member",
    "participant_employment",
    "participant_pension",
    "participant_beneficiary",
];

fn col(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name))
}

/// Build a child table with the shared columns plus its payload columns.
fn child_table(table: &str, payload: Vec<ColumnDef>, with_file: bool) -> TableCreateStatement {
    let mut stmt = Table::create();
    stmt.table(Alias::new(table))
        .if_not_exists()
        .col(ColumnDef::new(Child::Id).string_len(32).not_null().primary_key())
        .col(ColumnDef::new(Child::TenantId).string_len(64).not_null())
        .col(ColumnDef::new(Child::ProductId).string_len(64).not_null())
        .col(ColumnDef::new(Child::ParticipantId).string_len(32).not_null());

    for column in payload {
        stmt.col(column);
    }

    stmt.col(ColumnDef::new(Child::Version).integer().not_null().default(1))
        .col(
            ColumnDef::new(Child::RecordState)
                .string_len(16)
                .not_null()
                .default("active"),
        )
        .col(
            ColumnDef::new(Child::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(Child::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(ColumnDef::new(Child::DeletedAt).timestamp_with_time_zone())
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{table}_participant"))
                .from(Alias::new(table), Child::ParticipantId)
                .to(Participant::Table, Participant::Id)
                .on_delete(ForeignKeyAction::Cascade),
        );

    if with_file {
        stmt.foreign_key(
            ForeignKey::create()
                .name(format!("fk_{table}_file"))
                .from(Alias::new(table), Child::FileId)
                .to(File::Table, File::Id)
                .on_delete(ForeignKeyAction::SetNull),
        );
    }

    stmt.to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let tables = vec![
            child_table(
                "participant_identity",
                vec![
                    col("identity_type").string_len(32).not_null().to_owned(),
                    col("identity_number").string_len(64).not_null().to_owned(),
                    col("issued_date").date().to_owned(),
                    col("expiry_date").date().to_owned(),
                    col("file_id").string_len(32).to_owned(),
                ],
                true,
            ),
            child_table(
                "participant_address",
                vec![
                    col("address_type").string_len(32).not_null().to_owned(),
                    col("street").text().not_null().to_owned(),
                    col("city").string_len(128).not_null().to_owned(),
                    col("province").string_len(128).not_null().to_owned(),
                    col("postal_code").string_len(16).to_owned(),
                    col("country_code").string_len(8).not_null().to_owned(),
                ],
                false,
            ),
            child_table(
                "participant_bank_account",
                vec![
                    col("bank_code").string_len(32).not_null().to_owned(),
                    col("account_number").string_len(64).not_null().to_owned(),
                    col("account_holder_name").string_len(256).not_null().to_owned(),
                    col("currency_code").string_len(8).not_null().to_owned(),
                    col("is_primary").boolean().not_null().default(false).to_owned(),
                    col("file_id").string_len(32).to_owned(),
                ],
                true,
            ),
            child_table(
                "participant_family_member",
                vec![
                    col("full_name").string_len(256).not_null().to_owned(),
                    col("relationship").string_len(32).not_null().to_owned(),
                    col("date_of_birth").date().to_owned(),
                    col("is_dependent").boolean().not_null().default(false).to_owned(),
                    col("file_id").string_len(32).to_owned(),
                ],
                true,
            ),
            child_table(
                "participant_employment",
                vec![
                    col("employer_name").string_len(256).not_null().to_owned(),
                    col("occupation_code").string_len(32).not_null().to_owned(),
                    col("position").string_len(128).to_owned(),
                    col("employment_status").string_len(32).not_null().to_owned(),
                    col("income_range_code").string_len(32).to_owned(),
                    col("start_date").date().to_owned(),
                ],
                false,
            ),
            child_table(
                "participant_pension",
                vec![
                    col("participant_number").string_len(64).not_null().to_owned(),
                    col("program_code").string_len(32).to_owned(),
                    col("effective_date").date().to_owned(),
                    col("retirement_age").integer().to_owned(),
                ],
                false,
            ),
            child_table(
                "participant_beneficiary",
                vec![
                    col("full_name").string_len(256).not_null().to_owned(),
                    col("relationship").string_len(32).not_null().to_owned(),
                    col("national_id").string_len(32).to_owned(),
                    col("allocation_percent").integer().not_null().to_owned(),
                    col("file_id").string_len(32).to_owned(),
                ],
                true,
            ),
        ];

        for table in tables {
            manager.create_table(table).await?;
        }

        for table in CHILD_TABLES {
            manager
                .create_index(
                    Index::create()
                        .name(format!("idx_{table}_participant"))
                        .table(Alias::new(table))
                        .col(Child::TenantId)
                        .col(Child::ProductId)
                        .col(Child::ParticipantId)
                        .to_owned(),
                )
                .await?;
        }

        let db = manager.get_connection();

        // Singleton children: at most one live row per participant.
        for table in ["participant_employment", "participant_pension"] {
            db.execute_unprepared(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_live_unique \
                 ON {table} (participant_id) WHERE record_state = 'active'"
            ))
            .await?;
        }

        // External participant numbers are unique within a product.
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_participant_pension_number_unique \
             ON participant_pension (tenant_id, product_id, participant_number) \
             WHERE record_state = 'active'",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in CHILD_TABLES.iter().rev() {
            manager
                .drop_table(Table::drop().table(Alias::new(*table)).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum Child {
    Id,
    TenantId,
    ProductId,
    ParticipantId,
    FileId,
    Version,
    RecordState,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum Participant {
    Table,
    Id,
}

#[derive(Iden)]
enum File {
    Table,
    Id,
}
