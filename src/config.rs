//! Process configuration read from the environment
//!
//! `.env` is loaded by `main` before [`AppConfig::from_env`] runs.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::models::chain::ChainType;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_BIND_ADDR: &str = "BIND_ADDR";
const ENV_DAILY_CHECK_IN_CODE: &str = "DAILY_CHECK_IN_CODE";
const ENV_DAILY_CHECK_IN_VALUE: &str = "DAILY_CHECK_IN_VALUE";
const ENV_IPFS_GATEWAY: &str = "IPFS_GATEWAY";
const ENV_LISTENER_REFRESH_INTERVAL_SECS: &str = "LISTENER_REFRESH_INTERVAL_SECS";

const ENV_POLYGON_RPC: &str = "POLYGON_RPC";
const ENV_POLYGON_RPC_SOCKET: &str = "POLYGON_RPC_SOCKET";
const ENV_MANTLE_TESTNET_RPC: &str = "MANTLE_TESTNET_RPC";
const ENV_MANTLE_TESTNET_RPC_SOCKET: &str = "MANTLE_TESTNET_RPC_SOCKET";
const ENV_FILECOIN_MAINNET_RPC: &str = "FILECOIN_MAINNET_RPC";
const ENV_FILECOIN_MAINNET_RPC_SOCKET: &str = "FILECOIN_MAINNET_RPC_SOCKET";
const ENV_FILECOIN_TESTNET_RPC: &str = "FILECOIN_TESTNET_RPC";
const ENV_FILECOIN_TESTNET_RPC_SOCKET: &str = "FILECOIN_TESTNET_RPC_SOCKET";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_DAILY_CHECK_IN_CODE: &str = "daily_check_in";
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

const MANTLE_TESTNET_CHAIN_ID: i32 = 5001;
const FILECOIN_TESTNET_CHAIN_ID: i32 = 314159;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "{} must be set", name),
            ConfigError::Invalid { name, value } => {
                write!(f, "{} has an invalid value: {}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Call and socket endpoints of one chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainEndpoints {
    pub http: Option<String>,
    pub socket: Option<String>,
}

/// RPC endpoints for every chain the registry knows how to reach
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    pub polygon: ChainEndpoints,
    pub mantle_testnet: ChainEndpoints,
    pub filecoin_mainnet: ChainEndpoints,
    pub filecoin_testnet: ChainEndpoints,
}

impl RpcConfig {
    pub fn from_env() -> Self {
        Self {
            polygon: endpoints(ENV_POLYGON_RPC, ENV_POLYGON_RPC_SOCKET),
            mantle_testnet: endpoints(ENV_MANTLE_TESTNET_RPC, ENV_MANTLE_TESTNET_RPC_SOCKET),
            filecoin_mainnet: endpoints(ENV_FILECOIN_MAINNET_RPC, ENV_FILECOIN_MAINNET_RPC_SOCKET),
            filecoin_testnet: endpoints(ENV_FILECOIN_TESTNET_RPC, ENV_FILECOIN_TESTNET_RPC_SOCKET),
        }
    }

    /// Endpoints serving a (chain_type, chain_id) pair.
    ///
    /// Unknown Ethereum chain ids fall back to Polygon, unknown Filecoin ids
    /// to mainnet. Fuel has no endpoints.
    pub fn endpoints_for(&self, chain_type: ChainType, chain_id: i32) -> Option<&ChainEndpoints> {
        match chain_type {
            ChainType::Ethereum => match chain_id {
                MANTLE_TESTNET_CHAIN_ID => Some(&self.mantle_testnet),
                _ => Some(&self.polygon),
            },
            ChainType::Filecoin => match chain_id {
                FILECOIN_TESTNET_CHAIN_ID => Some(&self.filecoin_testnet),
                _ => Some(&self.filecoin_mainnet),
            },
            ChainType::Fuel => None,
        }
    }
}

fn endpoints(http: &str, socket: &str) -> ChainEndpoints {
    ChainEndpoints {
        http: env::var(http).ok().filter(|v| !v.is_empty()),
        socket: env::var(socket).ok().filter(|v| !v.is_empty()),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub daily_check_in_code: String,
    pub daily_check_in_value: Decimal,
    pub ipfs_gateway: String,
    pub listener_refresh_interval_secs: Option<u64>,
    pub rpc: RpcConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var(ENV_DATABASE_URL).map_err(|_| ConfigError::Missing(ENV_DATABASE_URL))?;

        Ok(Self {
            database_url,
            bind_addr: env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            daily_check_in_code: env::var(ENV_DAILY_CHECK_IN_CODE)
                .unwrap_or_else(|_| DEFAULT_DAILY_CHECK_IN_CODE.to_string()),
            daily_check_in_value: parse_or(ENV_DAILY_CHECK_IN_VALUE, Decimal::from(10))?,
            ipfs_gateway: env::var(ENV_IPFS_GATEWAY)
                .unwrap_or_else(|_| DEFAULT_IPFS_GATEWAY.to_string()),
            listener_refresh_interval_secs: parse_optional(ENV_LISTENER_REFRESH_INTERVAL_SECS)?,
            rpc: RpcConfig::from_env(),
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(name)?.unwrap_or(default))
}

fn parse_optional<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}
