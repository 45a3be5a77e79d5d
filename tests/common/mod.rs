#![allow(dead_code)]

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use futures_util::StreamExt;
use loyalty_backend::{
    build_router,
    entities::collections,
    error::AppError,
    models::chain::{TokenMetadata, TransferEvent},
    services::{
        chain_provider::{ChainError, ChainProvider, SubscriptionHandle, TransferSubscription},
        metadata::MetadataFetcher,
    },
    store::MemoryStore,
    AppState,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
pub const BOB: &str = "0x0000000000000000000000000000000000000b0b";

/// Chain double: balances are set by the test, transfers pushed through channels
#[derive(Default)]
pub struct MockChain {
    balances: Mutex<HashMap<(i32, String, i64), i64>>,
    senders: Mutex<HashMap<i32, (B256, mpsc::UnboundedSender<TransferEvent>)>>,
    subscriptions: Mutex<u64>,
    pub unsubscribe_calls: Mutex<Vec<i32>>,
}

impl MockChain {
    pub fn set_balance(&self, collection_id: i32, owner: &str, token_id: i64, amount: i64) {
        self.balances
            .lock()
            .insert((collection_id, owner.to_string(), token_id), amount);
    }

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
impl ChainProvider for MockChain {
    async fn balance_of(
        &self,
        collection: &collections::Model,
        owner: &str,
        token_id: i64,
    ) -> Result<i64, ChainError> {
        Ok(self
            .balances
            .lock()
            .get(&(collection.id, owner.to_string(), token_id))
            .copied()
            .unwrap_or(0))
    }

    async fn token_uri(
        &self,
        _collection: &collections::Model,
        token_id: i64,
    ) -> Result<String, ChainError> {
        Ok(format!("ipfs://bafy/{}.json", token_id))
    }

    async fn subscribe_transfers(
        &self,
        collection: &collections::Model,
    ) -> Result<TransferSubscription, ChainError> {
        let id = {
            let mut count = self.subscriptions.lock();
            *count += 1;
            B256::from(U256::from(*count))
        };
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

pub struct StaticMetadata;

#[async_trait]
impl MetadataFetcher for StaticMetadata {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata, AppError> {
        Ok(TokenMetadata {
            name: format!("Token {}", uri),
            description: None,
            image: None,
        })
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<MockChain>,
    pub state: AppState,
    pub router: Router,
}

/// Set up the full HTTP surface over in-memory storage and a mock chain
pub fn setup_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::default());
    let state = AppState::new(
        store.clone(),
        chain.clone(),
        Arc::new(StaticMetadata),
        "daily_check_in".to_string(),
        Decimal::from(10),
    );
    let router = build_router(state.clone());

    TestApp {
        store,
        chain,
        state,
        router,
    }
}

impl TestApp {
    /// Send one request through the router and decode the JSON body
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_for<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

/// Decimals serialize as strings; accept plain numbers too
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a decimal: {}", other),
    }
}

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Connect to the database named by TEST_DATABASE_URL and bring its schema up
/// to date. Returns None when the variable is unset so the suite still runs
/// without Postgres.
pub async fn setup_test_db() -> Option<DatabaseConnection> {
    let database_url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping Postgres test");
            return None;
        }
    };

    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    MIGRATED
        .get_or_try_init(|| async { Migrator::up(&db, None).await })
        .await
        .expect("Failed to migrate test DB");
    Some(db)
}

/// Id no earlier run has used, so rows left behind never collide
pub fn unique_id() -> i32 {
    static NEXT: AtomicI32 = AtomicI32::new(0);
    let base = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros()
        % 1_000_000_000;
    base as i32 + NEXT.fetch_add(1_000, Ordering::SeqCst)
}
