use loyalty_backend::{
    build_router,
    config::AppConfig,
    jobs::listener_refresh::start_listener_refresh_job,
    services::{chain_provider::EvmChainProvider, metadata::HttpMetadataFetcher},
    store::SeaOrmStore,
    AppState,
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loyalty_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().expect("Invalid configuration");

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(SeaOrmStore::new(db));
    let chain = Arc::new(EvmChainProvider::new(config.rpc.clone()));
    let metadata = Arc::new(HttpMetadataFetcher::new(config.ipfs_gateway.clone()));

    let state = AppState::new(
        store,
        chain,
        metadata,
        config.daily_check_in_code.clone(),
        config.daily_check_in_value,
    );

    // Attach a transfer listener to every known collection
    match state.listeners.reset_all().await {
        Ok(report) => tracing::info!(
            "Listeners ready: {} installed, {} skipped, {} failed",
            report.installed,
            report.skipped,
            report.failed
        ),
        Err(e) => tracing::error!("Failed to install listeners: {}", e),
    }

    if let Some(interval_secs) = config.listener_refresh_interval_secs {
        tracing::info!("Refreshing listeners every {}s", interval_secs);
        start_listener_refresh_job(state.listeners.clone(), interval_secs);
    }

    let listeners = state.listeners.clone();
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap();

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .unwrap();

    listeners.shutdown();
}
