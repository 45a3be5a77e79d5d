use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create streaks table keyed by (user_id, owner_id)
        manager
            .create_table(
                Table::create()
                    .table(Streaks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Streaks::UserId).integer().not_null())
                    .col(ColumnDef::new(Streaks::OwnerId).integer().not_null())
                    .col(
                        ColumnDef::new(Streaks::StreakCount)
                            .integer()
                            .not_null()
                            .default(1)
                            .check(Expr::col(Streaks::StreakCount).gte(1)),
                    )
                    .col(
                        ColumnDef::new(Streaks::LastCheckIn)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .primary_key(
                        Index::create()
                            .col(Streaks::UserId)
                            .col(Streaks::OwnerId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Streaks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Streaks {
    Table,
    UserId,
    OwnerId,
    StreakCount,
    LastCheckIn,
}
