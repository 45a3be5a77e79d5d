use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Collections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Collections::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Collections::Name).string().not_null())
                    .col(ColumnDef::new(Collections::OwnerId).integer().not_null())
                    .col(
                        ColumnDef::new(Collections::ChainType)
                            .string_len(16)
                            .not_null()
                            .default("ethereum"),
                    )
                    .col(ColumnDef::new(Collections::ChainId).integer().not_null())
                    .col(
                        ColumnDef::new(Collections::ContractAddress)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Collections::Standard)
                            .string_len(16)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One collection per deployed contract
        manager
            .create_index(
                Index::create()
                    .name("unique_contract")
                    .table(Collections::Table)
                    .col(Collections::ChainType)
                    .col(Collections::ChainId)
                    .col(Collections::ContractAddress)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Collections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Collections {
    Table,
    Id,
    Name,
    OwnerId,
    ChainType,
    ChainId,
    ContractAddress,
    Standard,
}
