use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserLoyaltyTotals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserLoyaltyTotals::UserId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserLoyaltyTotals::OwnerId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserLoyaltyTotals::TotalPoints)
                            .decimal_len(20, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserLoyaltyTotals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(UserLoyaltyTotals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .primary_key(
                        Index::create()
                            .col(UserLoyaltyTotals::UserId)
                            .col(UserLoyaltyTotals::OwnerId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserLoyaltyTotals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserLoyaltyTotals {
    Table,
    UserId,
    OwnerId,
    TotalPoints,
    CreatedAt,
    UpdatedAt,
}
