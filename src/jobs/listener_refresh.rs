//! Periodic listener refresh
//!
//! Rebuilds every transfer listener on a fixed interval so dropped socket
//! subscriptions and collections edited outside this process are picked up.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::services::listener_registry::ListenerRegistry;

pub fn start_listener_refresh_job(
    registry: Arc<ListenerRegistry>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and startup has just installed everything
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("Starting scheduled listener refresh");
                    match registry.reset_all().await {
                        Ok(report) => tracing::info!(
                            installed = report.installed,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Listener refresh complete"
                        ),
                        Err(e) => tracing::error!("Failed to refresh listeners: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Stopping listener refresh job");
                    break;
                }
            }
        }
    })
}
