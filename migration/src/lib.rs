pub use sea_orm_migration::prelude::*;

mod m20240518_000001_create_users;
mod m20240518_000002_create_collections;
mod m20240518_000003_create_items;
mod m20240518_000004_create_nfts;
mod m20240518_000005_create_loyalties;
mod m20240908_000001_create_loyalty_transactions;
mod m20240912_000001_create_user_loyalty_totals;
mod m20240926_000001_create_streaks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240518_000001_create_users::Migration),
            Box::new(m20240518_000002_create_collections::Migration),
            Box::new(m20240518_000003_create_items::Migration),
            Box::new(m20240518_000004_create_nfts::Migration),
            Box::new(m20240518_000005_create_loyalties::Migration),
            Box::new(m20240908_000001_create_loyalty_transactions::Migration),
            Box::new(m20240912_000001_create_user_loyalty_totals::Migration),
            Box::new(m20240926_000001_create_streaks::Migration),
        ]
    }
}
