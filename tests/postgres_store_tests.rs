mod common;

use chrono::{Duration, Utc};
use loyalty_backend::entities::{collections, loyalty_transactions, prelude::*, streaks};
use loyalty_backend::models::loyalty::{LedgerStatus, LoyaltyType, NewLedgerEntry};
use loyalty_backend::store::{
    LoyaltyRepository, NewItem, NewRule, OwnershipRepository, SeaOrmStore, StreakRepository,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::common::{setup_test_db, unique_id};

fn entry(user_id: i32, owner_id: i32, points: Decimal) -> NewLedgerEntry {
    NewLedgerEntry {
        user_id,
        owner_id,
        code: Some("SPEND".to_string()),
        points,
        rule_type: LoyaltyType::RepeatVariable,
        status: LedgerStatus::for_delta(points),
    }
}

#[tokio::test]
async fn test_append_entry_keeps_total_equal_to_ledger_sum() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = SeaOrmStore::new(db);
    let (user_id, owner_id) = (unique_id(), unique_id());

    let (_, total) = store.append_entry(entry(user_id, owner_id, dec!(10))).await.unwrap();
    assert_eq!(total, dec!(10));
    let (_, total) = store
        .append_entry(entry(user_id, owner_id, dec!(-3.5)))
        .await
        .unwrap();
    assert_eq!(total, dec!(6.5));
    let (failed, total) = store
        .append_entry(entry(user_id, owner_id, Decimal::ZERO))
        .await
        .unwrap();
    assert_eq!(failed.status, "failed");
    assert_eq!(total, dec!(6.5));

    assert_eq!(store.get_total(user_id, owner_id).await.unwrap(), Some(dec!(6.5)));
    assert_eq!(store.sum_points(user_id, owner_id).await.unwrap(), dec!(6.5));

    let entries = store.list_transactions(user_id, owner_id).await.unwrap();
    let points: Vec<Decimal> = entries.iter().map(|e| e.points).collect();
    assert_eq!(points, vec![Decimal::ZERO, dec!(-3.5), dec!(10)]);
}

#[tokio::test]
async fn test_concurrent_appends_leave_consistent_total() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = SeaOrmStore::new(db);
    let (user_id, owner_id) = (unique_id(), unique_id());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.append_entry(entry(user_id, owner_id, dec!(1.25))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.sum_points(user_id, owner_id).await.unwrap(), dec!(25));
    assert_eq!(store.get_total(user_id, owner_id).await.unwrap(), Some(dec!(25)));
}

#[tokio::test]
async fn test_create_rule_is_find_or_create() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = SeaOrmStore::new(db);
    let owner_id = unique_id();
    let rule = |value| NewRule {
        owner_id,
        code: "WELCOME10".to_string(),
        value,
        rule_type: LoyaltyType::RepeatFixed,
    };

    let (first, created) = store.create_rule(rule(dec!(10))).await.unwrap();
    assert!(created);
    let (second, created) = store.create_rule(rule(dec!(99))).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);
    assert_eq!(second.value, dec!(10));
}

#[tokio::test]
async fn test_leaderboard_groups_success_entries_in_window() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = SeaOrmStore::new(db.clone());
    let owner_id = unique_id();
    let (early, late, stale, idle) = (unique_id(), unique_id(), unique_id(), unique_id());

    store.append_entry(entry(early, owner_id, dec!(40))).await.unwrap();
    store.append_entry(entry(late, owner_id, dec!(30))).await.unwrap();
    store.append_entry(entry(late, owner_id, dec!(20))).await.unwrap();
    store.append_entry(entry(stale, owner_id, dec!(500))).await.unwrap();
    store.append_entry(entry(idle, owner_id, Decimal::ZERO)).await.unwrap();

    LoyaltyTransactions::update_many()
        .col_expr(
            loyalty_transactions::Column::CreatedAt,
            Expr::value((Utc::now() - Duration::days(10)).fixed_offset()),
        )
        .filter(loyalty_transactions::Column::UserId.eq(stale))
        .filter(loyalty_transactions::Column::OwnerId.eq(owner_id))
        .exec(&db)
        .await
        .unwrap();

    let since = (Utc::now() - Duration::days(7)).fixed_offset();
    let ranked = store.leaderboard(owner_id, since, 10, 0).await.unwrap();
    assert_eq!(ranked, vec![(late, dec!(50)), (early, dec!(40))]);

    let page = store.leaderboard(owner_id, since, 1, 1).await.unwrap();
    assert_eq!(page, vec![(early, dec!(40))]);
}

#[tokio::test]
async fn test_streak_upsert() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = SeaOrmStore::new(db);
    let (user_id, owner_id) = (unique_id(), unique_id());
    let now = Utc::now().fixed_offset();

    assert!(store.get_streak(user_id, owner_id).await.unwrap().is_none());
    for streak_count in [1, 2] {
        store
            .save_streak(streaks::Model {
                user_id,
                owner_id,
                streak_count,
                last_check_in: now,
            })
            .await
            .unwrap();
    }

    let streak = store.get_streak(user_id, owner_id).await.unwrap().unwrap();
    assert_eq!(streak.streak_count, 2);
}

#[tokio::test]
async fn test_ownership_find_or_create_and_nft_upsert() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let store = SeaOrmStore::new(db.clone());
    let wallet = format!("0x{:040x}", unique_id());

    let collection = collections::ActiveModel {
        name: Set("Passes".to_string()),
        owner_id: Set(unique_id()),
        chain_type: Set("ethereum".to_string()),
        chain_id: Set(137),
        contract_address: Set(format!("0x{:040x}", unique_id())),
        standard: Set("erc1155".to_string()),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap();

    let new_item = |name: &str| NewItem {
        collection_id: collection.id,
        token_id: 7,
        name: name.to_string(),
        description: None,
        image_uri: None,
    };
    let item = store.find_or_create_item(new_item("Gold")).await.unwrap();
    let again = store.find_or_create_item(new_item("Renamed")).await.unwrap();
    assert_eq!(again.id, item.id);
    assert_eq!(again.name, "Gold");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let wallet = wallet.clone();
        handles.push(tokio::spawn(async move {
            store.find_or_create_user_by_wallet(&wallet).await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    let user_id = ids[0];

    store.set_nft_amount(user_id, item.id, 3).await.unwrap();
    store.set_nft_amount(user_id, item.id, 0).await.unwrap();
    let nft = store.get_nft(user_id, item.id).await.unwrap().unwrap();
    assert_eq!(nft.amount, 0);

    let records = Nfts::find()
        .filter(loyalty_backend::entities::nfts::Column::UserId.eq(user_id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}
