use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Nfts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Nfts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Nfts::UserId).integer().not_null())
                    .col(ColumnDef::new(Nfts::ItemId).integer().not_null())
                    .col(
                        ColumnDef::new(Nfts::Amount)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Nfts::Amount).gte(0)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_nfts_user")
                            .from(Nfts::Table, Nfts::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_nfts_item")
                            .from(Nfts::Table, Nfts::ItemId)
                            .to(Items::Table, Items::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("unique_user_item")
                    .table(Nfts::Table)
                    .col(Nfts::UserId)
                    .col(Nfts::ItemId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Nfts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Nfts {
    Table,
    Id,
    UserId,
    ItemId,
    Amount,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Items {
    Table,
    Id,
}
