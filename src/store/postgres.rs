//! Postgres-backed repositories

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict, Order};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};

use super::{LoyaltyRepository, NewItem, NewRule, OwnershipRepository, RuleChanges, StreakRepository};
use crate::entities::prelude::*;
use crate::entities::{
    collections, items, loyalties, loyalty_transactions, nfts, streaks, user_loyalty_totals, users,
};
use crate::error::{db_err, AppError};
use crate::models::loyalty::{LedgerStatus, NewLedgerEntry};

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

async fn ledger_sum<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    owner_id: i32,
) -> Result<Decimal, sea_orm::DbErr> {
    let sum: Option<Option<Decimal>> = LoyaltyTransactions::find()
        .select_only()
        .column_as(Expr::col(loyalty_transactions::Column::Points).sum(), "total")
        .filter(loyalty_transactions::Column::UserId.eq(user_id))
        .filter(loyalty_transactions::Column::OwnerId.eq(owner_id))
        .into_tuple::<Option<Decimal>>()
        .one(conn)
        .await?;

    Ok(sum.flatten().unwrap_or(Decimal::ZERO))
}

#[async_trait]
impl LoyaltyRepository for SeaOrmStore {
    async fn find_rule(
        &self,
        owner_id: i32,
        code: &str,
    ) -> Result<Option<loyalties::Model>, AppError> {
        Loyalties::find()
            .filter(loyalties::Column::OwnerId.eq(owner_id))
            .filter(loyalties::Column::Code.eq(code))
            .one(&self.db)
            .await
            .map_err(db_err("find_rule"))
    }

    async fn list_rules(&self, owner_id: i32) -> Result<Vec<loyalties::Model>, AppError> {
        Loyalties::find()
            .filter(loyalties::Column::OwnerId.eq(owner_id))
            .order_by_asc(loyalties::Column::Code)
            .all(&self.db)
            .await
            .map_err(db_err("list_rules"))
    }

    async fn create_rule(&self, rule: NewRule) -> Result<(loyalties::Model, bool), AppError> {
        if let Some(existing) = self.find_rule(rule.owner_id, &rule.code).await? {
            return Ok((existing, false));
        }

        let active = loyalties::ActiveModel {
            owner_id: Set(rule.owner_id),
            code: Set(rule.code.clone()),
            value: Set(rule.value),
            rule_type: Set(rule.rule_type.as_str().to_string()),
            ..Default::default()
        };

        match active.insert(&self.db).await {
            Ok(model) => Ok((model, true)),
            // Lost a race against a concurrent create on the unique (owner_id, code) index
            Err(e) => match self.find_rule(rule.owner_id, &rule.code).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(db_err("create_rule")(e)),
            },
        }
    }

    async fn update_rule(
        &self,
        owner_id: i32,
        code: &str,
        changes: RuleChanges,
    ) -> Result<Option<loyalties::Model>, AppError> {
        let Some(rule) = self.find_rule(owner_id, code).await? else {
            return Ok(None);
        };

        let mut active = rule.into_active_model();
        if let Some(value) = changes.value {
            active.value = Set(value);
        }
        if let Some(rule_type) = changes.rule_type {
            active.rule_type = Set(rule_type.as_str().to_string());
        }

        active
            .update(&self.db)
            .await
            .map(Some)
            .map_err(db_err("update_rule"))
    }

    async fn delete_rule(&self, owner_id: i32, code: &str) -> Result<bool, AppError> {
        let result = Loyalties::delete_many()
            .filter(loyalties::Column::OwnerId.eq(owner_id))
            .filter(loyalties::Column::Code.eq(code))
            .exec(&self.db)
            .await
            .map_err(db_err("delete_rule"))?;

        Ok(result.rows_affected > 0)
    }

    async fn find_transaction(
        &self,
        user_id: i32,
        owner_id: i32,
        code: &str,
    ) -> Result<Option<loyalty_transactions::Model>, AppError> {
        LoyaltyTransactions::find()
            .filter(loyalty_transactions::Column::UserId.eq(user_id))
            .filter(loyalty_transactions::Column::OwnerId.eq(owner_id))
            .filter(loyalty_transactions::Column::Code.eq(code))
            .one(&self.db)
            .await
            .map_err(db_err("find_transaction"))
    }

    async fn sum_points(&self, user_id: i32, owner_id: i32) -> Result<Decimal, AppError> {
        ledger_sum(&self.db, user_id, owner_id)
            .await
            .map_err(db_err("sum_points"))
    }

    async fn append_entry(
        &self,
        entry: NewLedgerEntry,
    ) -> Result<(loyalty_transactions::Model, Decimal), AppError> {
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await.map_err(db_err("append_entry"))?;

        // Writers for the same pair queue here until commit, so each one sums a
        // ledger that already includes every earlier entry
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock($1, $2)",
            [entry.user_id.into(), entry.owner_id.into()],
        ))
        .await
        .map_err(db_err("append_entry"))?;

        let stored = loyalty_transactions::ActiveModel {
            user_id: Set(entry.user_id),
            owner_id: Set(entry.owner_id),
            code: Set(entry.code),
            points: Set(entry.points),
            rule_type: Set(entry.rule_type.as_str().to_string()),
            status: Set(entry.status.as_str().to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(db_err("append_entry"))?;

        let total = ledger_sum(&txn, entry.user_id, entry.owner_id)
            .await
            .map_err(db_err("append_entry"))?;

        UserLoyaltyTotals::insert(user_loyalty_totals::ActiveModel {
            user_id: Set(entry.user_id),
            owner_id: Set(entry.owner_id),
            total_points: Set(total),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([
                user_loyalty_totals::Column::UserId,
                user_loyalty_totals::Column::OwnerId,
            ])
            .update_columns([
                user_loyalty_totals::Column::TotalPoints,
                user_loyalty_totals::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(db_err("append_entry"))?;

        txn.commit().await.map_err(db_err("append_entry"))?;

        Ok((stored, total))
    }

    async fn get_total(&self, user_id: i32, owner_id: i32) -> Result<Option<Decimal>, AppError> {
        let row = UserLoyaltyTotals::find_by_id((user_id, owner_id))
            .one(&self.db)
            .await
            .map_err(db_err("get_total"))?;

        Ok(row.map(|r| r.total_points))
    }

    async fn list_transactions(
        &self,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Vec<loyalty_transactions::Model>, AppError> {
        LoyaltyTransactions::find()
            .filter(loyalty_transactions::Column::UserId.eq(user_id))
            .filter(loyalty_transactions::Column::OwnerId.eq(owner_id))
            .order_by_desc(loyalty_transactions::Column::CreatedAt)
            .order_by_desc(loyalty_transactions::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err("list_transactions"))
    }

    async fn leaderboard(
        &self,
        owner_id: i32,
        since: DateTime<FixedOffset>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<(i32, Decimal)>, AppError> {
        let total = Expr::col(loyalty_transactions::Column::Points).sum();
        let rows: Vec<(i32, Option<Decimal>)> = LoyaltyTransactions::find()
            .select_only()
            .column(loyalty_transactions::Column::UserId)
            .column_as(total.clone(), "total_points")
            .filter(loyalty_transactions::Column::OwnerId.eq(owner_id))
            .filter(loyalty_transactions::Column::Status.eq(LedgerStatus::Success.as_str()))
            .filter(loyalty_transactions::Column::CreatedAt.gte(since))
            .group_by(loyalty_transactions::Column::UserId)
            .order_by(total, Order::Desc)
            .order_by_asc(loyalty_transactions::Column::UserId)
            .limit(limit)
            .offset(offset)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(db_err("leaderboard"))?;

        Ok(rows
            .into_iter()
            .map(|(user_id, points)| (user_id, points.unwrap_or(Decimal::ZERO)))
            .collect())
    }
}

#[async_trait]
impl StreakRepository for SeaOrmStore {
    async fn get_streak(
        &self,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Option<streaks::Model>, AppError> {
        Streaks::find_by_id((user_id, owner_id))
            .one(&self.db)
            .await
            .map_err(db_err("get_streak"))
    }

    async fn save_streak(&self, streak: streaks::Model) -> Result<streaks::Model, AppError> {
        Streaks::insert(streaks::ActiveModel {
            user_id: Set(streak.user_id),
            owner_id: Set(streak.owner_id),
            streak_count: Set(streak.streak_count),
            last_check_in: Set(streak.last_check_in),
        })
        .on_conflict(
            OnConflict::columns([streaks::Column::UserId, streaks::Column::OwnerId])
                .update_columns([streaks::Column::StreakCount, streaks::Column::LastCheckIn])
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .map_err(db_err("save_streak"))?;

        Ok(streak)
    }
}

#[async_trait]
impl OwnershipRepository for SeaOrmStore {
    async fn find_collection(
        &self,
        collection_id: i32,
    ) -> Result<Option<collections::Model>, AppError> {
        Collections::find_by_id(collection_id)
            .one(&self.db)
            .await
            .map_err(db_err("find_collection"))
    }

    async fn list_collections(&self) -> Result<Vec<collections::Model>, AppError> {
        Collections::find()
            .order_by_asc(collections::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err("list_collections"))
    }

    async fn find_item(
        &self,
        collection_id: i32,
        token_id: i64,
    ) -> Result<Option<items::Model>, AppError> {
        Items::find()
            .filter(items::Column::CollectionId.eq(collection_id))
            .filter(items::Column::TokenId.eq(token_id))
            .one(&self.db)
            .await
            .map_err(db_err("find_item"))
    }

    async fn list_items(&self, collection_id: i32) -> Result<Vec<items::Model>, AppError> {
        Items::find()
            .filter(items::Column::CollectionId.eq(collection_id))
            .order_by_asc(items::Column::TokenId)
            .all(&self.db)
            .await
            .map_err(db_err("list_items"))
    }

    async fn find_or_create_item(&self, item: NewItem) -> Result<items::Model, AppError> {
        if let Some(existing) = self.find_item(item.collection_id, item.token_id).await? {
            return Ok(existing);
        }

        Items::insert(items::ActiveModel {
            collection_id: Set(item.collection_id),
            token_id: Set(item.token_id),
            name: Set(item.name),
            description: Set(item.description),
            image_uri: Set(item.image_uri),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([items::Column::CollectionId, items::Column::TokenId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .map_err(db_err("find_or_create_item"))?;

        self.find_item(item.collection_id, item.token_id)
            .await?
            .ok_or_else(|| AppError::not_found("item", "find_or_create_item"))
    }

    async fn find_or_create_user_by_wallet(&self, wallet: &str) -> Result<users::Model, AppError> {
        let find = || {
            Users::find()
                .filter(users::Column::EthWalletAddress.eq(wallet))
                .one(&self.db)
        };

        if let Some(user) = find().await.map_err(db_err("find_or_create_user"))? {
            return Ok(user);
        }

        let now = Utc::now().fixed_offset();
        Users::insert(users::ActiveModel {
            eth_wallet_address: Set(Some(wallet.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(users::Column::EthWalletAddress)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .map_err(db_err("find_or_create_user"))?;

        find()
            .await
            .map_err(db_err("find_or_create_user"))?
            .ok_or_else(|| AppError::not_found("user", "find_or_create_user"))
    }

    async fn list_users_with_wallet(&self) -> Result<Vec<users::Model>, AppError> {
        Users::find()
            .filter(users::Column::EthWalletAddress.is_not_null())
            .order_by_asc(users::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err("list_users_with_wallet"))
    }

    async fn get_nft(&self, user_id: i32, item_id: i32) -> Result<Option<nfts::Model>, AppError> {
        Nfts::find()
            .filter(nfts::Column::UserId.eq(user_id))
            .filter(nfts::Column::ItemId.eq(item_id))
            .one(&self.db)
            .await
            .map_err(db_err("get_nft"))
    }

    async fn set_nft_amount(
        &self,
        user_id: i32,
        item_id: i32,
        amount: i64,
    ) -> Result<nfts::Model, AppError> {
        Nfts::insert(nfts::ActiveModel {
            user_id: Set(user_id),
            item_id: Set(item_id),
            amount: Set(amount),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([nfts::Column::UserId, nfts::Column::ItemId])
                .update_column(nfts::Column::Amount)
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .map_err(db_err("set_nft_amount"))?;

        self.get_nft(user_id, item_id)
            .await?
            .ok_or_else(|| AppError::not_found("nft", "set_nft_amount"))
    }
}
