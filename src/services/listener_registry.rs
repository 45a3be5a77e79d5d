//! Chain listener registry
//!
//! Owns at most one live transfer subscription per collection. Each
//! subscription runs in its own task that feeds events, one at a time, to the
//! [`TransferReconciler`]. A listener whose collection has disappeared removes
//! itself. Every path that forgets a listener also cancels its subscription
//! on the node, including dropping the registry.

use futures_util::future::join_all;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::entities::collections;
use crate::error::{chain_err, AppError};
use crate::models::chain::ChainType;
use crate::services::chain_provider::{ChainProvider, SubscriptionHandle, TransferStream};
use crate::services::transfer_reconciler::{ReconcileOutcome, TransferReconciler};
use crate::store::OwnershipRepository;

struct ListenerHandle {
    /// Distinguishes a listener from the one that replaced it
    generation: u64,
    subscription: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Result of a bulk install
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: usize,
    /// Collections on chains without an event stream
    pub skipped: usize,
    pub failed: usize,
}

pub struct ListenerRegistry {
    store: Arc<dyn OwnershipRepository>,
    chain: Arc<dyn ChainProvider>,
    reconciler: Arc<TransferReconciler>,
    listeners: Mutex<HashMap<i32, ListenerHandle>>,
    generation: AtomicU64,
}

impl ListenerRegistry {
    pub fn new(
        store: Arc<dyn OwnershipRepository>,
        chain: Arc<dyn ChainProvider>,
        reconciler: Arc<TransferReconciler>,
    ) -> Self {
        Self {
            store,
            chain,
            reconciler,
            listeners: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Subscribe to a collection's transfers, replacing any existing listener.
    ///
    /// Returns false when the collection's chain has no event stream.
    pub async fn install(self: &Arc<Self>, collection_id: i32) -> Result<bool, AppError> {
        let collection = self
            .store
            .find_collection(collection_id)
            .await?
            .ok_or_else(|| AppError::not_found("collection", "install_listener"))?;

        self.install_collection(&collection).await
    }

    async fn install_collection(
        self: &Arc<Self>,
        collection: &collections::Model,
    ) -> Result<bool, AppError> {
        let chain_type = ChainType::from_str(&collection.chain_type).map_err(AppError::Validation)?;
        if !chain_type.supports_event_stream() {
            debug!(
                collection_id = collection.id,
                chain_type = %chain_type,
                "Chain has no event stream, not listening"
            );
            return Ok(false);
        }

        let subscription = self
            .chain
            .subscribe_transfers(collection)
            .await
            .map_err(chain_err("subscribe_transfers"))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = {
            let mut listeners = self.listeners.lock();
            let task = tokio::spawn(run_listener(
                Arc::downgrade(self),
                collection.id,
                generation,
                subscription.stream,
            ));
            listeners.insert(
                collection.id,
                ListenerHandle {
                    generation,
                    subscription: subscription.handle,
                    task,
                },
            )
        };

        if let Some(previous) = previous {
            self.release(previous);
        }

        info!(
            collection_id = collection.id,
            contract = %collection.contract_address,
            chain_type = %chain_type,
            chain_id = collection.chain_id,
            "Transfer listener installed"
        );
        Ok(true)
    }

    /// Stop listening to a collection. Returns false when nothing was installed.
    pub fn remove(&self, collection_id: i32) -> bool {
        let handle = self.listeners.lock().remove(&collection_id);
        match handle {
            Some(handle) => {
                self.release(handle);
                info!(collection_id, "Transfer listener removed");
                true
            }
            None => false,
        }
    }

    /// Remove then install, for collections whose chain or address changed
    pub async fn reset(self: &Arc<Self>, collection_id: i32) -> Result<bool, AppError> {
        self.remove(collection_id);
        self.install(collection_id).await
    }

    pub async fn install_all(self: &Arc<Self>) -> Result<InstallReport, AppError> {
        let collections = self.store.list_collections().await?;
        Ok(self.install_each(&collections).await)
    }

    /// Rebuild every listener from the current collections. Listeners for
    /// collections that no longer exist are dropped.
    pub async fn reset_all(self: &Arc<Self>) -> Result<InstallReport, AppError> {
        let collections = self.store.list_collections().await?;
        let known: HashSet<i32> = collections.iter().map(|c| c.id).collect();

        let stale: Vec<i32> = self
            .listeners
            .lock()
            .keys()
            .filter(|id| !known.contains(*id))
            .copied()
            .collect();
        for collection_id in stale {
            self.remove(collection_id);
        }
        for collection in &collections {
            self.remove(collection.id);
        }

        Ok(self.install_each(&collections).await)
    }

    async fn install_each(self: &Arc<Self>, collections: &[collections::Model]) -> InstallReport {
        let results = join_all(collections.iter().map(|c| self.install_collection(c))).await;

        let mut report = InstallReport::default();
        for (collection, result) in collections.iter().zip(results) {
            match result {
                Ok(true) => report.installed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(collection_id = collection.id, error = %e, "Failed to install transfer listener");
                }
            }
        }

        info!(
            installed = report.installed,
            skipped = report.skipped,
            failed = report.failed,
            "Transfer listeners installed"
        );
        report
    }

    pub fn is_active(&self, collection_id: i32) -> bool {
        self.listeners
            .lock()
            .get(&collection_id)
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Collection ids with a live listener, ascending
    pub fn active_collections(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, h)| !h.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn shutdown(&self) {
        let handles: Vec<_> = self.listeners.lock().drain().collect();
        let count = handles.len();
        for (_, handle) in handles {
            self.release(handle);
        }
        if count > 0 {
            info!(count, "Transfer listeners stopped");
        }
    }

    /// Stop the task and cancel its subscription on the node
    fn release(&self, handle: ListenerHandle) {
        handle.task.abort();
        self.unsubscribe(&handle.subscription);
    }

    fn unsubscribe(&self, subscription: &SubscriptionHandle) {
        if let Err(e) = self.chain.unsubscribe(subscription) {
            warn!(
                collection_id = subscription.collection_id,
                error = %e,
                "Failed to cancel transfer subscription"
            );
        }
    }

    /// Forget a listener unless it has already been replaced. Called from the
    /// listener's own task, so the task is left to return on its own.
    fn detach_if_current(&self, collection_id: i32, generation: u64) {
        let detached = {
            let mut listeners = self.listeners.lock();
            if listeners
                .get(&collection_id)
                .is_some_and(|h| h.generation == generation)
            {
                listeners.remove(&collection_id)
            } else {
                None
            }
        };

        if let Some(handle) = detached {
            self.unsubscribe(&handle.subscription);
        }
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        let handles: Vec<_> = self.listeners.get_mut().drain().collect();
        for (_, handle) in handles {
            self.release(handle);
        }
    }
}

async fn run_listener(
    registry: Weak<ListenerRegistry>,
    collection_id: i32,
    generation: u64,
    mut stream: TransferStream,
) {
    while let Some(event) = stream.next().await {
        let Some(registry) = registry.upgrade() else {
            return;
        };

        if registry.reconciler.handle_transfer(&event).await == ReconcileOutcome::CollectionMissing {
            info!(collection_id, "Collection deleted, removing its transfer listener");
            registry.detach_if_current(collection_id, generation);
            return;
        }
    }

    warn!(collection_id, "Transfer stream closed");
    if let Some(registry) = registry.upgrade() {
        registry.detach_if_current(collection_id, generation);
    }
}
