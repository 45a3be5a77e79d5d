//! Chain access for collection contracts
//!
//! [`ChainProvider`] is the seam between the listener/reconciler and the
//! chains. [`EvmChainProvider`] talks to EVM-compatible RPC endpoints with
//! alloy, keeping one HTTP and one socket connection per (chain_type, chain_id).

use alloy::{
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider, WsConnect},
    pubsub::PubSubFrontend,
    rpc::types::Filter,
    sol,
    sol_types::SolEvent,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use moka::future::Cache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RpcConfig;
use crate::entities::collections;
use crate::models::chain::{ChainKey, ChainType, TransferEvent};

// Multi-token collection contract: transfer event, balances and metadata URIs
sol! {
    #[sol(rpc)]
    interface ICollectionToken {
        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);

        function balanceOf(address account, uint256 id) external view returns (uint256);
        function uri(uint256 id) external view returns (string);
    }
}

/// Transfer notifications for one collection, in chain order
pub type TransferStream = BoxStream<'static, TransferEvent>;

/// Identifies a live transfer subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub collection_id: i32,
    pub id: B256,
}

/// An open subscription. The node keeps delivering until
/// [`ChainProvider::unsubscribe`] is called with `handle`; dropping `stream`
/// alone does not cancel it.
pub struct TransferSubscription {
    pub handle: SubscriptionHandle,
    pub stream: TransferStream,
}

/// Error types for chain access
#[derive(Debug)]
pub enum ChainError {
    ProviderError(String),
    ContractCallError(String),
    InvalidConfig(String),
    Unsupported(String),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::ProviderError(msg) => write!(f, "Provider error: {}", msg),
            ChainError::ContractCallError(msg) => write!(f, "Contract call error: {}", msg),
            ChainError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            ChainError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// On-chain balance of `owner` for `token_id` in the collection's contract
    async fn balance_of(
        &self,
        collection: &collections::Model,
        owner: &str,
        token_id: i64,
    ) -> Result<i64, ChainError>;

    /// Metadata URI of `token_id`
    async fn token_uri(
        &self,
        collection: &collections::Model,
        token_id: i64,
    ) -> Result<String, ChainError>;

    /// Open a transfer subscription
    async fn subscribe_transfers(
        &self,
        collection: &collections::Model,
    ) -> Result<TransferSubscription, ChainError>;

    /// Cancel a subscription on the node. Unknown handles are a no-op.
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), ChainError>;
}

fn chain_key(collection: &collections::Model) -> Result<ChainKey, ChainError> {
    let chain_type = ChainType::from_str(&collection.chain_type).map_err(ChainError::InvalidConfig)?;
    Ok(ChainKey {
        chain_type,
        chain_id: collection.chain_id,
    })
}

fn parse_address(raw: &str, what: &str) -> Result<Address, ChainError> {
    Address::from_str(raw)
        .map_err(|e| ChainError::InvalidConfig(format!("Invalid {} address {}: {}", what, raw, e)))
}

fn u256_to_i64(value: U256, what: &str) -> Result<i64, ChainError> {
    u64::try_from(value)
        .ok()
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| ChainError::ContractCallError(format!("{} out of range: {}", what, value)))
}

/// Lowercase 0x-prefixed hex, the form wallet addresses are stored in
pub fn format_address(address: Address) -> String {
    address.to_string().to_lowercase()
}

fn decode_transfer(log: &alloy::rpc::types::Log, collection_id: i32) -> Option<TransferEvent> {
    let decoded = match log.log_decode::<ICollectionToken::TransferSingle>() {
        Ok(decoded) => decoded.inner.data,
        Err(e) => {
            warn!(collection_id, error = %e, "Failed to decode TransferSingle log");
            return None;
        }
    };

    let token_id = u256_to_i64(decoded.id, "token id");
    let amount = u256_to_i64(decoded.value, "amount");
    match (token_id, amount) {
        (Ok(token_id), Ok(amount)) => Some(TransferEvent {
            operator: format_address(decoded.operator),
            from: format_address(decoded.from),
            to: format_address(decoded.to),
            token_id,
            amount,
            collection_id,
        }),
        (Err(e), _) | (_, Err(e)) => {
            warn!(collection_id, error = %e, "Dropping transfer with oversized values");
            None
        }
    }
}

/// alloy-backed provider for EVM-compatible chains
pub struct EvmChainProvider {
    rpc: RpcConfig,
    http: Cache<ChainKey, RootProvider<Http<Client>>>,
    sockets: Cache<ChainKey, RootProvider<PubSubFrontend>>,
    /// Connection each live subscription was opened on
    subscriptions: Mutex<HashMap<B256, RootProvider<PubSubFrontend>>>,
}

impl EvmChainProvider {
    pub fn new(rpc: RpcConfig) -> Self {
        Self {
            rpc,
            http: Cache::builder().max_capacity(16).build(),
            sockets: Cache::builder().max_capacity(16).build(),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    async fn http_provider(&self, key: ChainKey) -> Result<RootProvider<Http<Client>>, ChainError> {
        let url = self
            .rpc
            .endpoints_for(key.chain_type, key.chain_id)
            .and_then(|e| e.http.clone())
            .ok_or_else(|| {
                ChainError::Unsupported(format!(
                    "no RPC endpoint for {} chain {}",
                    key.chain_type, key.chain_id
                ))
            })?;

        self.http
            .try_get_with(key, async move {
                Ok::<_, ChainError>(ProviderBuilder::new().on_http(url.parse().map_err(|e| {
                    ChainError::InvalidConfig(format!("Invalid RPC URL: {}", e))
                })?))
            })
            .await
            .map_err(|e: Arc<ChainError>| ChainError::InvalidConfig(e.to_string()))
    }

    async fn socket_provider(
        &self,
        key: ChainKey,
    ) -> Result<RootProvider<PubSubFrontend>, ChainError> {
        let url = self
            .rpc
            .endpoints_for(key.chain_type, key.chain_id)
            .and_then(|e| e.socket.clone())
            .ok_or_else(|| {
                ChainError::Unsupported(format!(
                    "no socket endpoint for {} chain {}",
                    key.chain_type, key.chain_id
                ))
            })?;

        self.sockets
            .try_get_with(key, async move {
                info!(chain_type = %key.chain_type, chain_id = key.chain_id, "Opening socket connection");
                ProviderBuilder::new()
                    .on_ws(WsConnect::new(url))
                    .await
                    .map_err(|e| ChainError::ProviderError(format!("Socket connection failed: {}", e)))
            })
            .await
            .map_err(|e: Arc<ChainError>| ChainError::ProviderError(e.to_string()))
    }
}

#[async_trait]
impl ChainProvider for EvmChainProvider {
    async fn balance_of(
        &self,
        collection: &collections::Model,
        owner: &str,
        token_id: i64,
    ) -> Result<i64, ChainError> {
        let provider = self.http_provider(chain_key(collection)?).await?;
        let contract_address = parse_address(&collection.contract_address, "contract")?;
        let owner = parse_address(owner, "owner")?;

        let contract = ICollectionToken::new(contract_address, &provider);
        let balance = contract
            .balanceOf(owner, U256::from(token_id as u64))
            .call()
            .await
            .map_err(|e| ChainError::ContractCallError(format!("balanceOf failed: {}", e)))?
            ._0;

        u256_to_i64(balance, "balance")
    }

    async fn token_uri(
        &self,
        collection: &collections::Model,
        token_id: i64,
    ) -> Result<String, ChainError> {
        let provider = self.http_provider(chain_key(collection)?).await?;
        let contract_address = parse_address(&collection.contract_address, "contract")?;

        let contract = ICollectionToken::new(contract_address, &provider);
        let uri = contract
            .uri(U256::from(token_id as u64))
            .call()
            .await
            .map_err(|e| ChainError::ContractCallError(format!("uri failed: {}", e)))?
            ._0;

        Ok(uri)
    }

    async fn subscribe_transfers(
        &self,
        collection: &collections::Model,
    ) -> Result<TransferSubscription, ChainError> {
        let key = chain_key(collection)?;
        if !key.chain_type.supports_event_stream() {
            return Err(ChainError::Unsupported(format!(
                "{} has no event stream",
                key.chain_type
            )));
        }

        let contract_address = parse_address(&collection.contract_address, "contract")?;
        let provider = self.socket_provider(key).await?;

        let filter = Filter::new()
            .address(contract_address)
            .event_signature(ICollectionToken::TransferSingle::SIGNATURE_HASH);

        let subscription = match provider.subscribe_logs(&filter).await {
            Ok(subscription) => subscription,
            Err(e) => {
                // The cached connection may be dead; reconnect on the next attempt
                self.sockets.invalidate(&key).await;
                return Err(ChainError::ProviderError(format!(
                    "Log subscription failed: {}",
                    e
                )));
            }
        };

        let collection_id = collection.id;
        let id = *subscription.local_id();
        self.subscriptions.lock().insert(id, provider.clone());
        debug!(collection_id, contract = %contract_address, subscription = %id, "Subscribed to TransferSingle logs");

        let stream = subscription.into_stream().filter_map(move |log| {
            // Holds the socket connection open for as long as the stream lives
            let _connection = &provider;
            futures_util::future::ready(decode_transfer(&log, collection_id))
        });

        Ok(TransferSubscription {
            handle: SubscriptionHandle { collection_id, id },
            stream: stream.boxed(),
        })
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), ChainError> {
        let Some(provider) = self.subscriptions.lock().remove(&handle.id) else {
            return Ok(());
        };

        provider
            .unsubscribe(handle.id)
            .map_err(|e| ChainError::ProviderError(format!("Unsubscribe failed: {}", e)))?;
        debug!(collection_id = handle.collection_id, subscription = %handle.id, "Unsubscribed from TransferSingle logs");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Chain provider driven by the test: balances are set directly and
    //! transfers are pushed through a channel.

    use super::*;
    use tokio::sync::mpsc;

    #[derive(Default)]
    pub struct ScriptedChain {
        balances: Mutex<HashMap<(i32, String, i64), i64>>,
        failing_balances: Mutex<Vec<String>>,
        uris: Mutex<HashMap<(i32, i64), String>>,
        senders: Mutex<HashMap<i32, (B256, mpsc::UnboundedSender<TransferEvent>)>>,
        failing_subscriptions: Mutex<Vec<i32>>,
        pub subscribe_calls: Mutex<Vec<i32>>,
        pub unsubscribe_calls: Mutex<Vec<i32>>,
    }

    impl ScriptedChain {
        pub fn set_balance(&self, collection_id: i32, owner: &str, token_id: i64, amount: i64) {
            self.balances
                .lock()
                .insert((collection_id, owner.to_string(), token_id), amount);
        }

        /// Make `balanceOf(owner, ..)` revert
        pub fn fail_balance_for(&self, owner: &str) {
            self.failing_balances.lock().push(owner.to_string());
        }

        pub fn set_uri(&self, collection_id: i32, token_id: i64, uri: &str) {
            self.uris
                .lock()
                .insert((collection_id, token_id), uri.to_string());
        }

        pub fn fail_subscriptions_for(&self, collection_id: i32) {
            self.failing_subscriptions.lock().push(collection_id);
        }

        /// Deliver a transfer to the live subscription; false when there is none
        pub fn emit(&self, event: TransferEvent) -> bool {
            match self.senders.lock().get(&event.collection_id) {
                Some((_, tx)) => tx.send(event).is_ok(),
                None => false,
            }
        }

        pub fn has_subscriber(&self, collection_id: i32) -> bool {
            self.senders
                .lock()
                .get(&collection_id)
                .is_some_and(|(_, tx)| !tx.is_closed())
        }
    }

    #[async_trait]
    impl ChainProvider for ScriptedChain {
        async fn balance_of(
            &self,
            collection: &collections::Model,
            owner: &str,
            token_id: i64,
        ) -> Result<i64, ChainError> {
            if self.failing_balances.lock().iter().any(|o| o == owner) {
                return Err(ChainError::ContractCallError("balanceOf reverted".to_string()));
            }
            Ok(self
                .balances
                .lock()
                .get(&(collection.id, owner.to_string(), token_id))
                .copied()
                .unwrap_or(0))
        }

        async fn token_uri(
            &self,
            collection: &collections::Model,
            token_id: i64,
        ) -> Result<String, ChainError> {
            self.uris
                .lock()
                .get(&(collection.id, token_id))
                .cloned()
                .ok_or_else(|| ChainError::ContractCallError("uri reverted".to_string()))
        }

        async fn subscribe_transfers(
            &self,
            collection: &collections::Model,
        ) -> Result<TransferSubscription, ChainError> {
            let serial = {
                let mut calls = self.subscribe_calls.lock();
                calls.push(collection.id);
                calls.len() as u64
            };
            if self.failing_subscriptions.lock().contains(&collection.id) {
                return Err(ChainError::ProviderError("socket refused".to_string()));
            }

            let id = B256::from(U256::from(serial));
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().insert(collection.id, (id, tx));
            let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed();

            Ok(TransferSubscription {
                handle: SubscriptionHandle {
                    collection_id: collection.id,
                    id,
                },
                stream,
            })
        }

        fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), ChainError> {
            self.unsubscribe_calls.lock().push(handle.collection_id);
            let mut senders = self.senders.lock();
            if senders
                .get(&handle.collection_id)
                .is_some_and(|(id, _)| *id == handle.id)
            {
                senders.remove(&handle.collection_id);
            }
            Ok(())
        }
    }
}
