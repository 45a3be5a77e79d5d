use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LoyaltyTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LoyaltyTransactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LoyaltyTransactions::UserId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LoyaltyTransactions::OwnerId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LoyaltyTransactions::Code).string().null())
                    .col(
                        ColumnDef::new(LoyaltyTransactions::Points)
                            .decimal_len(20, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LoyaltyTransactions::Type)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LoyaltyTransactions::Status)
                            .string_len(16)
                            .not_null()
                            .check(
                                Expr::col(LoyaltyTransactions::Status)
                                    .is_in(["success", "failed"]),
                            ),
                    )
                    .col(
                        ColumnDef::new(LoyaltyTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim lookups and per-pair sums
        manager
            .create_index(
                Index::create()
                    .name("idx_loyalty_transactions_user_owner_code")
                    .table(LoyaltyTransactions::Table)
                    .col(LoyaltyTransactions::UserId)
                    .col(LoyaltyTransactions::OwnerId)
                    .col(LoyaltyTransactions::Code)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LoyaltyTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LoyaltyTransactions {
    Table,
    Id,
    UserId,
    OwnerId,
    Code,
    Points,
    Type,
    Status,
    CreatedAt,
}
