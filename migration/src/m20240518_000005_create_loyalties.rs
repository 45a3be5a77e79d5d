use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Loyalties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Loyalties::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Loyalties::OwnerId).integer().not_null())
                    .col(ColumnDef::new(Loyalties::Code).string().not_null())
                    .col(
                        ColumnDef::new(Loyalties::Value)
                            .decimal_len(20, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Loyalties::Type).string_len(32).not_null())
                    .to_owned(),
            )
            .await?;

        // A code resolves to at most one rule per owner
        manager
            .create_index(
                Index::create()
                    .name("unique_owner_code")
                    .table(Loyalties::Table)
                    .col(Loyalties::OwnerId)
                    .col(Loyalties::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Loyalties::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Loyalties {
    Table,
    Id,
    OwnerId,
    Code,
    Value,
    Type,
}
