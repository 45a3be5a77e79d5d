//! SeaORM Entity for collections
//!
//! Only the on-chain identity of a collection is modelled here; the listener
//! registry keys its subscriptions by `id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "collections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub owner_id: i32,
    /// `ethereum`, `filecoin` or `fuel`
    pub chain_type: String,
    pub chain_id: i32,
    /// Contract address (0x format, 42 chars)
    pub contract_address: String,
    /// `erc721` or `erc1155`
    pub standard: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
