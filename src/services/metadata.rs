//! Token metadata fetcher
//!
//! Resolves a token URI to its JSON metadata. `ipfs://` URIs go through the
//! configured HTTP gateway.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::AppError;
use crate::models::chain::TokenMetadata;

const IPFS_SCHEME: &str = "ipfs://";

#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata, AppError>;
}

/// Substitute the `{id}` placeholder of multi-token URIs with the
/// zero-padded 64 digit hex token id
pub fn expand_token_uri(uri: &str, token_id: i64) -> String {
    if uri.contains("{id}") {
        uri.replace("{id}", &format!("{:064x}", token_id))
    } else {
        uri.to_string()
    }
}

pub struct HttpMetadataFetcher {
    client: Client,
    ipfs_gateway: String,
}

impl HttpMetadataFetcher {
    pub fn new(ipfs_gateway: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            ipfs_gateway,
        }
    }

    fn resolve(&self, uri: &str) -> String {
        match uri.strip_prefix(IPFS_SCHEME) {
            Some(path) => format!(
                "{}/{}",
                self.ipfs_gateway.trim_end_matches('/'),
                path.trim_start_matches("ipfs/")
            ),
            None => uri.to_string(),
        }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata, AppError> {
        let url = self.resolve(uri);
        debug!(url = %url, "Fetching token metadata");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::Metadata {
                context: "fetch_metadata",
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AppError::Metadata {
                context: "fetch_metadata",
                message: format!("{} returned {}", url, response.status()),
            });
        }

        response.json().await.map_err(|e| AppError::Metadata {
            context: "fetch_metadata",
            message: format!("invalid metadata JSON from {}: {}", url, e),
        })
    }
}
