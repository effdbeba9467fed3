use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Cooldown records: one row per address that has ever been funded.
        // The row is claimed with a conditional upsert before issuance, so the
        // primary-key constraint is what makes concurrent claims mutually
        // exclusive across process instances.
        manager
            .create_table(
                Table::create()
                    .table(CooldownRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CooldownRecords::Address)
                            .string_len(42)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CooldownRecords::LastDispensedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Dispensation log for auditing and the status/history endpoints.
        manager
            .create_table(
                Table::create()
                    .table(Dispensations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dispensations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Dispensations::RecipientAddress)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Dispensations::AmountWei)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Dispensations::TxHash)
                            .string_len(66)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Dispensations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_dispensations_address_time")
                            .col(Dispensations::RecipientAddress)
                            .col(Dispensations::CreatedAt),
                    )
                    .index(
                        Index::create()
                            .name("idx_dispensations_tx_hash")
                            .col(Dispensations::TxHash),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Dispensations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CooldownRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CooldownRecords {
    Table,
    Address,
    LastDispensedAt,
}

#[derive(DeriveIden)]
enum Dispensations {
    Table,
    Id,
    RecipientAddress,
    AmountWei,
    TxHash,
    CreatedAt,
}
