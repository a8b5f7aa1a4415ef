/*
 * Configuration management for the Megadrome swap engine
 */

use crate::models::{MegadromeError, Result};
use crate::tokens::WMON_ADDRESS;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub contracts: ContractAddresses,
    pub swap: SwapConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

/// Addresses of the external contracts the engine talks to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContractAddresses {
    pub router: Address,
    pub pair_factory: Address,
    pub wrapped_native: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwapConfig {
    pub quote_debounce_ms: u64,
    pub settings_path: Option<PathBuf>,
    pub token_list_url: Option<String>,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
}

impl SwapConfig {
    #[must_use]
    pub fn quote_debounce(&self) -> Duration {
        Duration::from_millis(self.quote_debounce_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|e| MegadromeError::ConfigError(format!("Invalid port: {e}")))?,
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            chain: ChainConfig {
                rpc_url: env::var("MONAD_RPC_URL")
                    .unwrap_or_else(|_| "https://rpc.monad.xyz".to_string()),
                chain_id: env::var("CHAIN_ID")
                    .unwrap_or_else(|_| "143".to_string())
                    .parse()
                    .map_err(|e| MegadromeError::ConfigError(format!("Invalid chain id: {e}")))?,
            },
            contracts: ContractAddresses {
                router: required_address("ROUTER_ADDRESS")?,
                pair_factory: required_address("POOL_FACTORY_ADDRESS")?,
                wrapped_native: match env::var("WRAPPED_NATIVE_ADDRESS") {
                    Ok(value) => parse_address("WRAPPED_NATIVE_ADDRESS", &value)?,
                    Err(_) => parse_address("WRAPPED_NATIVE_ADDRESS", WMON_ADDRESS)?,
                },
            },
            swap: SwapConfig {
                quote_debounce_ms: env::var("QUOTE_DEBOUNCE_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .map_err(|e| {
                        MegadromeError::ConfigError(format!("Invalid QUOTE_DEBOUNCE_MS: {e}"))
                    })?,
                settings_path: env::var("SETTINGS_PATH").ok().map(PathBuf::from),
                token_list_url: env::var("TOKEN_LIST_URL").ok(),
                private_key: env::var("PRIVATE_KEY").ok(),
            },
        })
    }
}

fn required_address(name: &str) -> Result<Address> {
    let value = env::var(name)
        .map_err(|_| MegadromeError::ConfigError(format!("{name} not set")))?;
    parse_address(name, &value)
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| MegadromeError::ConfigError(format!("Invalid {name} '{value}': {e}")))
}
