// src/lib.rs

use axum::{
    routing::{delete, get, post},
    Router,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use services::{
    chain_provider::ChainProvider, listener_registry::ListenerRegistry,
    loyalty_accrual::LoyaltyAccrualService, loyalty_rules::LoyaltyRuleService,
    metadata::MetadataFetcher, streaks::StreakService,
    transfer_reconciler::TransferReconciler,
};
use store::{LoyaltyRepository, OwnershipRepository, StreakRepository};

#[derive(Clone)]
pub struct AppState {
    pub loyalty: Arc<LoyaltyAccrualService>,
    pub rules: Arc<LoyaltyRuleService>,
    pub streaks: Arc<StreakService>,
    pub listeners: Arc<ListenerRegistry>,
}

impl AppState {
    /// Wire every service over one store
    pub fn new<S>(
        store: Arc<S>,
        chain: Arc<dyn ChainProvider>,
        metadata: Arc<dyn MetadataFetcher>,
        check_in_code: String,
        check_in_value: Decimal,
    ) -> Self
    where
        S: LoyaltyRepository + StreakRepository + OwnershipRepository + 'static,
    {
        let rules = Arc::new(LoyaltyRuleService::new(store.clone()));
        let loyalty = Arc::new(LoyaltyAccrualService::new(rules.clone(), store.clone()));
        let streaks = Arc::new(StreakService::new(
            store.clone(),
            loyalty.clone(),
            check_in_code,
            check_in_value,
        ));
        let reconciler = Arc::new(TransferReconciler::new(
            store.clone(),
            chain.clone(),
            metadata,
        ));
        let listeners = Arc::new(ListenerRegistry::new(store, chain, reconciler));

        Self {
            loyalty,
            rules,
            streaks,
            listeners,
        }
    }
}

pub mod entities {
    pub mod prelude;
    pub mod collections;
    pub mod items;
    pub mod loyalties;
    pub mod loyalty_transactions;
    pub mod nfts;
    pub mod streaks;
    pub mod user_loyalty_totals;
    pub mod users;
}

pub mod services {
    pub mod chain_provider;
    pub mod keyed_lock;
    pub mod listener_registry;
    pub mod loyalty_accrual;
    pub mod loyalty_rules;
    pub mod metadata;
    pub mod streaks;
    pub mod transfer_reconciler;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod store;

async fn health() -> &'static str {
    "ok"
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{listeners, loyalty, loyalty_rules, streaks};

    Router::new()
        .route("/health", get(health))
        // Loyalty ledger
        .route("/api/loyalty/points", get(loyalty::get_total_points))
        .route("/api/loyalty/transactions", get(loyalty::get_transactions))
        .route("/api/loyalty/claim", post(loyalty::claim_code))
        .route("/api/loyalty/admin/add-code", post(loyalty::admin_add_code))
        .route("/api/loyalty/leaderboard", get(loyalty::get_leaderboard))
        // Loyalty rules
        .route(
            "/api/loyalty/rules",
            get(loyalty_rules::list_rules)
                .post(loyalty_rules::create_rule)
                .put(loyalty_rules::update_rule)
                .delete(loyalty_rules::delete_rule),
        )
        // Streaks
        .route("/api/streaks", get(streaks::get_streak))
        .route("/api/streaks/check-in", post(streaks::check_in))
        // Chain listeners
        .route("/api/listeners", get(listeners::list_listeners))
        .route(
            "/api/listeners/{collection_id}/reset",
            post(listeners::reset_listener),
        )
        .route(
            "/api/listeners/{collection_id}",
            delete(listeners::remove_listener),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
