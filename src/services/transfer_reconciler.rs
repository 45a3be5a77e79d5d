//! Transfer reconciliation
//!
//! Mirrors on-chain transfers into item, user and NFT ownership records.
//! Multi-token collections re-read `balanceOf` for both parties, so the stored
//! amounts converge on chain state whatever order events arrive in. Each party
//! is reconciled on its own, so a failed read for one side (such as a reverting
//! `balanceOf(0x0)` on a mint) still updates the other. Single-owner
//! collections set the sender to 0 and the receiver to 1.
//!
//! Failures are logged and the event is dropped; nothing is retried here.
//! [`TransferReconciler::reindex_balances`] is the out-of-band catch-up pass.

use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::entities::{collections, items};
use crate::error::{chain_err, AppError};
use crate::models::chain::{Standard, TransferEvent};
use crate::services::chain_provider::ChainProvider;
use crate::services::metadata::{expand_token_uri, MetadataFetcher};
use crate::store::{NewItem, OwnershipRepository};

/// What happened to one transfer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    /// The collection no longer exists; its listener should be torn down
    CollectionMissing,
    /// Logged and dropped
    Failed,
}

/// Totals from a reindex pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReindexReport {
    pub collections: usize,
    pub checked: usize,
    pub written: usize,
    pub failed: usize,
}

pub struct TransferReconciler {
    store: Arc<dyn OwnershipRepository>,
    chain: Arc<dyn ChainProvider>,
    metadata: Arc<dyn MetadataFetcher>,
}

impl TransferReconciler {
    pub fn new(
        store: Arc<dyn OwnershipRepository>,
        chain: Arc<dyn ChainProvider>,
        metadata: Arc<dyn MetadataFetcher>,
    ) -> Self {
        Self {
            store,
            chain,
            metadata,
        }
    }

    pub async fn handle_transfer(&self, event: &TransferEvent) -> ReconcileOutcome {
        let collection = match self.store.find_collection(event.collection_id).await {
            Ok(Some(collection)) => collection,
            Ok(None) => {
                warn!(
                    collection_id = event.collection_id,
                    "Transfer for a deleted collection, dropping"
                );
                return ReconcileOutcome::CollectionMissing;
            }
            Err(e) => {
                error!(collection_id = event.collection_id, error = %e, "Failed to load collection");
                return ReconcileOutcome::Failed;
            }
        };

        let result = match Standard::from_str(&collection.standard) {
            Ok(Standard::Erc1155) => self.apply_balance_transfer(&collection, event).await,
            Ok(Standard::Erc721) => self.apply_single_owner_transfer(&collection, event).await,
            Err(e) => Err(AppError::Validation(e)),
        };

        match result {
            Ok(()) => {
                debug!(
                    collection_id = collection.id,
                    token_id = event.token_id,
                    from = %event.from,
                    to = %event.to,
                    "Transfer reconciled"
                );
                ReconcileOutcome::Applied
            }
            Err(e) => {
                error!(
                    collection_id = collection.id,
                    token_id = event.token_id,
                    context = ?e.context(),
                    error = %e,
                    "Failed to reconcile transfer"
                );
                ReconcileOutcome::Failed
            }
        }
    }

    async fn apply_balance_transfer(
        &self,
        collection: &collections::Model,
        event: &TransferEvent,
    ) -> Result<(), AppError> {
        let item = self
            .store
            .find_item(collection.id, event.token_id)
            .await?
            .ok_or_else(|| AppError::not_found("item", "reconcile_transfer"))?;

        let mut first_error = None;
        for wallet in [event.from.to_lowercase(), event.to.to_lowercase()] {
            if let Err(e) = self.apply_party_balance(collection, &item, &wallet).await {
                warn!(
                    collection_id = collection.id,
                    token_id = item.token_id,
                    wallet = %wallet,
                    error = %e,
                    "Failed to reconcile balance for one party"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn apply_party_balance(
        &self,
        collection: &collections::Model,
        item: &items::Model,
        wallet: &str,
    ) -> Result<(), AppError> {
        let user = self.store.find_or_create_user_by_wallet(wallet).await?;
        let balance = self
            .chain
            .balance_of(collection, wallet, item.token_id)
            .await
            .map_err(chain_err("balance_of"))?;
        self.store.set_nft_amount(user.id, item.id, balance).await?;
        Ok(())
    }

    async fn apply_single_owner_transfer(
        &self,
        collection: &collections::Model,
        event: &TransferEvent,
    ) -> Result<(), AppError> {
        let item = self.discover_item(collection, event.token_id).await?;

        let from = self
            .store
            .find_or_create_user_by_wallet(&event.from.to_lowercase())
            .await?;
        let to = self
            .store
            .find_or_create_user_by_wallet(&event.to.to_lowercase())
            .await?;

        self.store.set_nft_amount(from.id, item.id, 0).await?;
        self.store.set_nft_amount(to.id, item.id, 1).await?;

        Ok(())
    }

    async fn discover_item(
        &self,
        collection: &collections::Model,
        token_id: i64,
    ) -> Result<items::Model, AppError> {
        let uri = self
            .chain
            .token_uri(collection, token_id)
            .await
            .map_err(chain_err("token_uri"))?;
        let metadata = self.metadata.fetch(&expand_token_uri(&uri, token_id)).await?;

        self.store
            .find_or_create_item(NewItem {
                collection_id: collection.id,
                token_id,
                name: metadata.name,
                description: metadata.description,
                image_uri: metadata.image,
            })
            .await
    }

    /// Query `balanceOf` for every multi-token item and every user with a
    /// wallet, writing the amount when the user holds some or already has a
    /// record. Failed pairs are logged and skipped.
    pub async fn reindex_balances(&self) -> Result<ReindexReport, AppError> {
        let collections = self.store.list_collections().await?;
        let users = self.store.list_users_with_wallet().await?;
        let mut report = ReindexReport::default();

        for collection in collections
            .iter()
            .filter(|c| Standard::from_str(&c.standard) == Ok(Standard::Erc1155))
        {
            report.collections += 1;
            let items = self.store.list_items(collection.id).await?;
            info!(
                collection_id = collection.id,
                items = items.len(),
                users = users.len(),
                "Reindexing collection balances"
            );

            for item in &items {
                for user in &users {
                    let Some(wallet) = user.eth_wallet_address.as_deref() else {
                        continue;
                    };
                    report.checked += 1;

                    match self.reindex_pair(collection, item, user.id, wallet).await {
                        Ok(true) => report.written += 1,
                        Ok(false) => {}
                        Err(e) => {
                            report.failed += 1;
                            warn!(
                                collection_id = collection.id,
                                token_id = item.token_id,
                                user_id = user.id,
                                error = %e,
                                "Failed to reindex balance"
                            );
                        }
                    }
                }
            }
        }

        info!(?report, "Balance reindex complete");
        Ok(report)
    }

    async fn reindex_pair(
        &self,
        collection: &collections::Model,
        item: &items::Model,
        user_id: i32,
        wallet: &str,
    ) -> Result<bool, AppError> {
        let balance = self
            .chain
            .balance_of(collection, wallet, item.token_id)
            .await
            .map_err(chain_err("balance_of"))?;

        if balance > 0 || self.store.get_nft(user_id, item.id).await?.is_some() {
            self.store.set_nft_amount(user_id, item.id, balance).await?;
            return Ok(true);
        }
        Ok(false)
    }
}
