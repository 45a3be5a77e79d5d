//! In-process repositories
//!
//! Same contracts as the Postgres store, guarded by a single mutex so every
//! call is atomic. Used by the test suites and for running the HTTP surface
//! without a database.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::{LoyaltyRepository, NewItem, NewRule, OwnershipRepository, RuleChanges, StreakRepository};
use crate::entities::{collections, items, loyalties, loyalty_transactions, nfts, streaks, users};
use crate::error::AppError;
use crate::models::chain::{ChainType, Standard};
use crate::models::loyalty::{LedgerStatus, NewLedgerEntry};

#[derive(Default)]
struct Inner {
    next_id: i32,
    rules: Vec<loyalties::Model>,
    ledger: Vec<loyalty_transactions::Model>,
    totals: HashMap<(i32, i32), Decimal>,
    streaks: HashMap<(i32, i32), streaks::Model>,
    collections: Vec<collections::Model>,
    items: Vec<items::Model>,
    users: Vec<users::Model>,
    nfts: Vec<nfts::Model>,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn ledger_sum(&self, user_id: i32, owner_id: i32) -> Decimal {
        self.ledger
            .iter()
            .filter(|e| e.user_id == user_id && e.owner_id == owner_id)
            .map(|e| e.points)
            .sum()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Seeding helpers for tests and local fixtures.
///
/// Collections, items and users belong to the catalogue and account services;
/// no production path writes them through this store, so these exist only to
/// put the in-process store into a known state.
impl MemoryStore {
    pub fn insert_collection(
        &self,
        name: &str,
        owner_id: i32,
        chain_type: ChainType,
        chain_id: i32,
        contract_address: &str,
        standard: Standard,
    ) -> collections::Model {
        let mut inner = self.inner.lock();
        let model = collections::Model {
            id: inner.next_id(),
            name: name.to_string(),
            owner_id,
            chain_type: chain_type.as_str().to_string(),
            chain_id,
            contract_address: contract_address.to_string(),
            standard: standard.as_str().to_string(),
        };
        inner.collections.push(model.clone());
        model
    }

    /// Simulates the catalogue deleting a collection. Returns false when the
    /// collection did not exist.
    pub fn delete_collection(&self, collection_id: i32) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.collections.len();
        inner.collections.retain(|c| c.id != collection_id);
        before != inner.collections.len()
    }

    pub fn insert_item(&self, collection_id: i32, token_id: i64, name: &str) -> items::Model {
        let mut inner = self.inner.lock();
        let model = items::Model {
            id: inner.next_id(),
            collection_id,
            token_id,
            name: name.to_string(),
            description: None,
            image_uri: None,
        };
        inner.items.push(model.clone());
        model
    }

    /// Wallets are stored lowercased, as the reconciler looks them up
    pub fn insert_user(&self, wallet: Option<&str>) -> users::Model {
        let mut inner = self.inner.lock();
        let now = Utc::now().fixed_offset();
        let model = users::Model {
            id: inner.next_id(),
            email: None,
            eth_wallet_address: wallet.map(str::to_lowercase),
            created_at: now,
            updated_at: now,
        };
        inner.users.push(model.clone());
        model
    }

    /// Move every ledger entry of the pair to `created_at`
    pub fn backdate_ledger(&self, user_id: i32, owner_id: i32, created_at: DateTime<FixedOffset>) {
        for entry in self
            .inner
            .lock()
            .ledger
            .iter_mut()
            .filter(|e| e.user_id == user_id && e.owner_id == owner_id)
        {
            entry.created_at = created_at;
        }
    }

    pub fn find_user_by_wallet(&self, wallet: &str) -> Option<users::Model> {
        self.inner
            .lock()
            .users
            .iter()
            .find(|u| u.eth_wallet_address.as_deref() == Some(wallet))
            .cloned()
    }
}

#[async_trait]
impl LoyaltyRepository for MemoryStore {
    async fn find_rule(
        &self,
        owner_id: i32,
        code: &str,
    ) -> Result<Option<loyalties::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .rules
            .iter()
            .find(|r| r.owner_id == owner_id && r.code == code)
            .cloned())
    }

    async fn list_rules(&self, owner_id: i32) -> Result<Vec<loyalties::Model>, AppError> {
        let mut rules: Vec<_> = self
            .inner
            .lock()
            .rules
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rules)
    }

    async fn create_rule(&self, rule: NewRule) -> Result<(loyalties::Model, bool), AppError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .rules
            .iter()
            .find(|r| r.owner_id == rule.owner_id && r.code == rule.code)
        {
            return Ok((existing.clone(), false));
        }

        let model = loyalties::Model {
            id: inner.next_id(),
            owner_id: rule.owner_id,
            code: rule.code,
            value: rule.value,
            rule_type: rule.rule_type.as_str().to_string(),
        };
        inner.rules.push(model.clone());
        Ok((model, true))
    }

    async fn update_rule(
        &self,
        owner_id: i32,
        code: &str,
        changes: RuleChanges,
    ) -> Result<Option<loyalties::Model>, AppError> {
        let mut inner = self.inner.lock();
        let Some(rule) = inner
            .rules
            .iter_mut()
            .find(|r| r.owner_id == owner_id && r.code == code)
        else {
            return Ok(None);
        };

        if let Some(value) = changes.value {
            rule.value = value;
        }
        if let Some(rule_type) = changes.rule_type {
            rule.rule_type = rule_type.as_str().to_string();
        }
        Ok(Some(rule.clone()))
    }

    async fn delete_rule(&self, owner_id: i32, code: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock();
        let before = inner.rules.len();
        inner
            .rules
            .retain(|r| !(r.owner_id == owner_id && r.code == code));
        Ok(before != inner.rules.len())
    }

    async fn find_transaction(
        &self,
        user_id: i32,
        owner_id: i32,
        code: &str,
    ) -> Result<Option<loyalty_transactions::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .ledger
            .iter()
            .find(|e| {
                e.user_id == user_id && e.owner_id == owner_id && e.code.as_deref() == Some(code)
            })
            .cloned())
    }

    async fn sum_points(&self, user_id: i32, owner_id: i32) -> Result<Decimal, AppError> {
        Ok(self.inner.lock().ledger_sum(user_id, owner_id))
    }

    async fn append_entry(
        &self,
        entry: NewLedgerEntry,
    ) -> Result<(loyalty_transactions::Model, Decimal), AppError> {
        let mut inner = self.inner.lock();
        let stored = loyalty_transactions::Model {
            id: inner.next_id(),
            user_id: entry.user_id,
            owner_id: entry.owner_id,
            code: entry.code,
            points: entry.points,
            rule_type: entry.rule_type.as_str().to_string(),
            status: entry.status.as_str().to_string(),
            created_at: Utc::now().fixed_offset(),
        };
        inner.ledger.push(stored.clone());

        let total = inner.ledger_sum(entry.user_id, entry.owner_id);
        inner.totals.insert((entry.user_id, entry.owner_id), total);
        Ok((stored, total))
    }

    async fn get_total(&self, user_id: i32, owner_id: i32) -> Result<Option<Decimal>, AppError> {
        Ok(self.inner.lock().totals.get(&(user_id, owner_id)).copied())
    }

    async fn list_transactions(
        &self,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Vec<loyalty_transactions::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id && e.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn leaderboard(
        &self,
        owner_id: i32,
        since: DateTime<FixedOffset>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<(i32, Decimal)>, AppError> {
        let inner = self.inner.lock();
        let mut sums: HashMap<i32, Decimal> = HashMap::new();
        for entry in inner.ledger.iter().filter(|e| {
            e.owner_id == owner_id
                && e.status == LedgerStatus::Success.as_str()
                && e.created_at >= since
        }) {
            *sums.entry(entry.user_id).or_default() += entry.points;
        }

        let mut ranked: Vec<(i32, Decimal)> = sums.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[async_trait]
impl StreakRepository for MemoryStore {
    async fn get_streak(
        &self,
        user_id: i32,
        owner_id: i32,
    ) -> Result<Option<streaks::Model>, AppError> {
        Ok(self.inner.lock().streaks.get(&(user_id, owner_id)).cloned())
    }

    async fn save_streak(&self, streak: streaks::Model) -> Result<streaks::Model, AppError> {
        self.inner
            .lock()
            .streaks
            .insert((streak.user_id, streak.owner_id), streak.clone());
        Ok(streak)
    }
}

#[async_trait]
impl OwnershipRepository for MemoryStore {
    async fn find_collection(
        &self,
        collection_id: i32,
    ) -> Result<Option<collections::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .collections
            .iter()
            .find(|c| c.id == collection_id)
            .cloned())
    }

    async fn list_collections(&self) -> Result<Vec<collections::Model>, AppError> {
        Ok(self.inner.lock().collections.clone())
    }

    async fn find_item(
        &self,
        collection_id: i32,
        token_id: i64,
    ) -> Result<Option<items::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .items
            .iter()
            .find(|i| i.collection_id == collection_id && i.token_id == token_id)
            .cloned())
    }

    async fn list_items(&self, collection_id: i32) -> Result<Vec<items::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .items
            .iter()
            .filter(|i| i.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn find_or_create_item(&self, item: NewItem) -> Result<items::Model, AppError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .items
            .iter()
            .find(|i| i.collection_id == item.collection_id && i.token_id == item.token_id)
        {
            return Ok(existing.clone());
        }

        let model = items::Model {
            id: inner.next_id(),
            collection_id: item.collection_id,
            token_id: item.token_id,
            name: item.name,
            description: item.description,
            image_uri: item.image_uri,
        };
        inner.items.push(model.clone());
        Ok(model)
    }

    async fn find_or_create_user_by_wallet(&self, wallet: &str) -> Result<users::Model, AppError> {
        let mut inner = self.inner.lock();
        if let Some(user) = inner
            .users
            .iter()
            .find(|u| u.eth_wallet_address.as_deref() == Some(wallet))
        {
            return Ok(user.clone());
        }

        let now = Utc::now().fixed_offset();
        let user = users::Model {
            id: inner.next_id(),
            email: None,
            eth_wallet_address: Some(wallet.to_string()),
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn list_users_with_wallet(&self) -> Result<Vec<users::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .users
            .iter()
            .filter(|u| u.eth_wallet_address.is_some())
            .cloned()
            .collect())
    }

    async fn get_nft(&self, user_id: i32, item_id: i32) -> Result<Option<nfts::Model>, AppError> {
        Ok(self
            .inner
            .lock()
            .nfts
            .iter()
            .find(|n| n.user_id == user_id && n.item_id == item_id)
            .cloned())
    }

    async fn set_nft_amount(
        &self,
        user_id: i32,
        item_id: i32,
        amount: i64,
    ) -> Result<nfts::Model, AppError> {
        let mut inner = self.inner.lock();
        if let Some(nft) = inner
            .nfts
            .iter_mut()
            .find(|n| n.user_id == user_id && n.item_id == item_id)
        {
            nft.amount = amount;
            return Ok(nft.clone());
        }

        let nft = nfts::Model {
            id: inner.next_id(),
            user_id,
            item_id,
            amount,
        };
        inner.nfts.push(nft.clone());
        Ok(nft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loyalty::{LedgerStatus, LoyaltyType};
    use rust_decimal_macros::dec;

    fn entry(points: Decimal) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: 1,
            owner_id: 7,
            code: Some("WELCOME10".to_string()),
            points,
            rule_type: LoyaltyType::RepeatFixed,
            status: LedgerStatus::for_delta(points),
        }
    }

    #[tokio::test]
    async fn test_total_tracks_ledger_sum() {
        let store = MemoryStore::new();
        assert_eq!(store.get_total(1, 7).await.unwrap(), None);

        store.append_entry(entry(dec!(10))).await.unwrap();
        let (_, total) = store.append_entry(entry(dec!(2.5))).await.unwrap();

        assert_eq!(total, dec!(12.5));
        assert_eq!(store.get_total(1, 7).await.unwrap(), Some(dec!(12.5)));
        assert_eq!(store.sum_points(1, 7).await.unwrap(), dec!(12.5));
        assert_eq!(store.sum_points(2, 7).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_transactions_newest_first() {
        let store = MemoryStore::new();
        store.append_entry(entry(dec!(1))).await.unwrap();
        store.append_entry(entry(dec!(2))).await.unwrap();

        let listed = store.list_transactions(1, 7).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].points, dec!(2));
        assert_eq!(listed[1].points, dec!(1));
    }

    #[tokio::test]
    async fn test_user_find_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.find_or_create_user_by_wallet("0xabc").await.unwrap();
        let b = store.find_or_create_user_by_wallet("0xabc").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_users_with_wallet().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_nft_amount_overwrites() {
        let store = MemoryStore::new();
        store.set_nft_amount(1, 2, 5).await.unwrap();
        let nft = store.set_nft_amount(1, 2, 0).await.unwrap();
        assert_eq!(nft.amount, 0);
        assert_eq!(store.get_nft(1, 2).await.unwrap().unwrap().amount, 0);
    }
}
