//! SeaORM Entity for loyalty rules
//!
//! A rule maps an owner's loyalty code to the way a claim is turned into points.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "loyalties")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_id: i32,
    /// Redeemable code, unique per owner
    pub code: String,
    /// Fixed award, or the divisor for variable rules
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub value: Decimal,
    /// Raw rule type (`ONE_FIXED`, `FIXED`, `ONE_VARIABLE`, ...)
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub rule_type: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
