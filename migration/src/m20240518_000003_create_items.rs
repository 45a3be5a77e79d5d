use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Items::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Items::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Items::CollectionId).integer().not_null())
                    .col(ColumnDef::new(Items::TokenId).big_integer().not_null())
                    .col(ColumnDef::new(Items::Name).string().not_null())
                    .col(ColumnDef::new(Items::Description).text().null())
                    .col(ColumnDef::new(Items::ImageUri).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_items_collection")
                            .from(Items::Table, Items::CollectionId)
                            .to(Collections::Table, Collections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("unique_token")
                    .table(Items::Table)
                    .col(Items::CollectionId)
                    .col(Items::TokenId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Items::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Items {
    Table,
    Id,
    CollectionId,
    TokenId,
    Name,
    Description,
    ImageUri,
}

#[derive(DeriveIden)]
enum Collections {
    Table,
    Id,
}
