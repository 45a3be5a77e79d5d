//! SeaORM Entity for the loyalty ledger
//!
//! Append-only: rows are inserted once per accrual attempt and never updated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "loyalty_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub owner_id: i32,
    pub code: Option<String>,
    /// Signed point delta
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub points: Decimal,
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub rule_type: String,
    /// `success` or `failed`
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
