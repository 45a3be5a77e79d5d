//! Persistence seams
//!
//! The services only talk to storage through these traits. [`SeaOrmStore`]
//! backs them with Postgres, [`MemoryStore`] keeps everything in process.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

use crate::entities::{collections, items, loyalties, loyalty_transactions, nfts, streaks, users};
use crate::error::AppError;
use crate::models::loyalty::{LoyaltyType, NewLedgerEntry};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::SeaOrmStore;

/// Rule about to be created
#[derive(Debug, Clone)]
pub struct NewRule {
    pub owner_id: i32,
    pub code: String,
    pub value: Decimal,
    pub rule_type: LoyaltyType,
}

/// Partial rule update; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct RuleChanges {
    pub value: Option<Decimal>,
    pub rule_type: Option<LoyaltyType>,
}

/// Item about to be found or created from token metadata
#[derive(Debug, Clone)]
pub struct NewItem {
    pub collection_id: i32,
    pub token_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image_uri: Option<String>,
}

#[async_trait]
pub trait LoyaltyRepository: Send + Sync {
    async fn find_rule(&self, owner_id: i32, code: &str)
        -> Result<Option<loyalties::Model>, AppError>;

    async fn list_rules(&self, owner_id: i32) -> Result<Vec<loyalties::Model>, AppError>;

    /// Find-or-create on (owner_id, code). The flag is true when a row was inserted.
    async fn create_rule(&self, rule: NewRule) -> Result<(loyalties::Model, bool), AppError>;

    async fn update_rule(
        &self,
        owner_id: i32,
        code: &str,
        changes: RuleChanges,
    ) -> Result<Option<loyalties::Model>, AppError>;

    /// Returns false when no rule matched
    async fn delete_rule(&self, owner_id: i32, code: &str) -> Result<bool, AppError>;

    async fn find_transaction(
        &self,
        user_id: i32,
        owner_id: i32,
        code: &str,
    ) -> Result<Option<loyalty_transactions::Model>, AppError>;

    /// Sum of every ledger entry for the pair, zero when there are none
    async fn sum_points(&self, user_id: i32, owner_id: i32) -> Result<Decimal, AppError>;

    /// Append an entry and rewrite the cached total from the new ledger sum.
    ///
    /// Both writes commit together or not at all. Returns the stored entry and
    /// the new total.
    async fn append_entry(
        &self,
        entry: NewLedgerEntry,
    ) -> Result<(loyalty_transactions::Model, Decimal), AppError>;

    async fn get_total(&self, user_id: i32, owner_id: i32) -> Result<Option<Decimal>, AppError>;

    /// Ledger entries, newest first
    async fn list_transactions(
        &self,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Vec<loyalty_transactions::Model>, AppError>;

    /// Users ranked by the sum of their `success` entries created at or after
    /// `since`. Highest sum first, ties broken by ascending user id.
    async fn leaderboard(
        &self,
        owner_id: i32,
        since: DateTime<FixedOffset>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<(i32, Decimal)>, AppError>;
}

#[async_trait]
pub trait StreakRepository: Send + Sync {
    async fn get_streak(&self, user_id: i32, owner_id: i32)
        -> Result<Option<streaks::Model>, AppError>;

    /// Insert or overwrite the streak for (user_id, owner_id)
    async fn save_streak(&self, streak: streaks::Model) -> Result<streaks::Model, AppError>;
}

#[async_trait]
pub trait OwnershipRepository: Send + Sync {
    async fn find_collection(&self, collection_id: i32)
        -> Result<Option<collections::Model>, AppError>;

    async fn list_collections(&self) -> Result<Vec<collections::Model>, AppError>;

    async fn find_item(&self, collection_id: i32, token_id: i64)
        -> Result<Option<items::Model>, AppError>;

    async fn list_items(&self, collection_id: i32) -> Result<Vec<items::Model>, AppError>;

    /// Existing items are returned untouched
    async fn find_or_create_item(&self, item: NewItem) -> Result<items::Model, AppError>;

    /// `wallet` must already be lowercased
    async fn find_or_create_user_by_wallet(&self, wallet: &str) -> Result<users::Model, AppError>;

    async fn list_users_with_wallet(&self) -> Result<Vec<users::Model>, AppError>;

    async fn get_nft(&self, user_id: i32, item_id: i32) -> Result<Option<nfts::Model>, AppError>;

    /// Create or overwrite the ownership record for (user_id, item_id)
    async fn set_nft_amount(
        &self,
        user_id: i32,
        item_id: i32,
        amount: i64,
    ) -> Result<nfts::Model, AppError>;
}
