//! Out-of-band balance reindex
//!
//! Walks every multi-token collection's items against every user with a
//! wallet address and rewrites NFT amounts from `balanceOf`. Catches up on
//! transfers the live listeners missed.

use loyalty_backend::{
    config::AppConfig,
    services::{
        chain_provider::EvmChainProvider, metadata::HttpMetadataFetcher,
        transfer_reconciler::TransferReconciler,
    },
    store::SeaOrmStore,
};
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loyalty_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    let reconciler = TransferReconciler::new(
        Arc::new(SeaOrmStore::new(db)),
        Arc::new(EvmChainProvider::new(config.rpc.clone())),
        Arc::new(HttpMetadataFetcher::new(config.ipfs_gateway.clone())),
    );

    let report = reconciler.reindex_balances().await?;
    tracing::info!(
        "Reindexed {} collections: {} pairs checked, {} written, {} failed",
        report.collections,
        report.checked,
        report.written,
        report.failed
    );

    Ok(())
}
