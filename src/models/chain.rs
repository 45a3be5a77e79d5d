//! Chain-side models: where a collection lives and what a transfer looks like

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Ethereum,
    Filecoin,
    Fuel,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Filecoin => "filecoin",
            Self::Fuel => "fuel",
        }
    }

    /// Fuel has no socket endpoint, so its collections are never listened to
    pub fn supports_event_stream(&self) -> bool {
        !matches!(self, Self::Fuel)
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" => Ok(Self::Ethereum),
            "filecoin" => Ok(Self::Filecoin),
            "fuel" => Ok(Self::Fuel),
            other => Err(format!("unknown chain type: {}", other)),
        }
    }
}

/// Token standard of a collection, which selects the reconciliation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Standard {
    Erc721,
    Erc1155,
}

impl Standard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc721 => "erc721",
            Self::Erc1155 => "erc1155",
        }
    }
}

impl FromStr for Standard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "erc721" => Ok(Self::Erc721),
            "erc1155" => Ok(Self::Erc1155),
            other => Err(format!("unknown token standard: {}", other)),
        }
    }
}

/// Provider connection key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub chain_type: ChainType,
    pub chain_id: i32,
}

/// Decoded `TransferSingle` notification for a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub operator: String,
    pub from: String,
    pub to: String,
    pub token_id: i64,
    pub amount: i64,
    pub collection_id: i32,
}

/// Token metadata JSON as served from the token URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}
