/*
 * Token descriptors and the Monad token registry
 */

use crate::models::{MegadromeError, Result};
use ethers::types::Address;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

pub const WMON_ADDRESS: &str = "0x3bd359C1119dA7Da1D913D1C4D2B7c461115433A";
pub const USDC_ADDRESS: &str = "0x754704Bc059F8C67012fEd69BC8A327a5aafb603";
pub const USDT_ADDRESS: &str = "0xe7cd86e13AC4309349F30B3435a9d337750fC82D";
pub const WETH_ADDRESS: &str = "0xEE8c0E9f1BFFb4Eb878d8f15f368A02a35481242";
pub const WBTC_ADDRESS: &str = "0x0555E30da8f98308EdB960aa94C0Db47230d2B9c";
pub const WSTETH_ADDRESS: &str = "0x10Aeaf63194db8d453d4D85a06E5eFE1dd0b5417";
pub const AUSD_ADDRESS: &str = "0x00000000efe302beaa2b3e6e1b18d08d69a9012a";
pub const BBZ_ADDRESS: &str = "0x0F498298F4a480883d52B854b628EdA82dA3158c";
pub const QUBOT_ADDRESS: &str = "0x22c09e09a2410d0b15FbfE21b681F39C0f46e14c";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenStandard {
    Native,
    Erc20,
}

/// A swappable asset. `address` is `None` only for the chain's native asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub address: Option<Address>,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
    pub standard: TokenStandard,
}

impl TokenDescriptor {
    #[must_use]
    pub fn native(symbol: &str, name: &str, decimals: u8) -> Self {
        Self {
            address: None,
            decimals,
            symbol: symbol.to_string(),
            name: name.to_string(),
            standard: TokenStandard::Native,
        }
    }

    #[must_use]
    pub fn erc20(address: Address, symbol: &str, name: &str, decimals: u8) -> Self {
        Self {
            address: Some(address),
            decimals,
            symbol: symbol.to_string(),
            name: name.to_string(),
            standard: TokenStandard::Erc20,
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.address.is_none() || self.standard == TokenStandard::Native
    }

    /// Address used when talking to the router: the native asset trades as
    /// its wrapped equivalent.
    #[must_use]
    pub fn routing_address(&self, wrapped_native: Address) -> Address {
        match self.address {
            Some(address) if !self.is_native() => address,
            _ => wrapped_native,
        }
    }
}

/// Entry of a remote token list. Only ERC-20 entries with an address are merged.
#[derive(Debug, Deserialize)]
struct RemoteToken {
    address: Option<String>,
    decimals: u8,
    symbol: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<TokenDescriptor>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::monad()
    }
}

impl TokenRegistry {
    #[must_use]
    pub fn new(tokens: Vec<TokenDescriptor>) -> Self {
        Self { tokens }
    }

    /// Canonical Monad token list.
    #[must_use]
    pub fn monad() -> Self {
        let erc20 = |address: &str, symbol: &str, name: &str, decimals: u8| {
            // Constants above are valid hex; a parse failure here is a typo in this file.
            let address = Address::from_str(address).unwrap_or_default();
            TokenDescriptor::erc20(address, symbol, name, decimals)
        };

        Self::new(vec![
            TokenDescriptor::native("MON", "Monad", 18),
            erc20(WMON_ADDRESS, "WMON", "Wrapped MON", 18),
            erc20(USDC_ADDRESS, "USDC", "USD Coin", 6),
            erc20(USDT_ADDRESS, "USDT", "Tether USD", 6),
            erc20(WETH_ADDRESS, "WETH", "Wrapped Ether", 18),
            erc20(WBTC_ADDRESS, "WBTC", "Wrapped Bitcoin", 8),
            erc20(WSTETH_ADDRESS, "wstETH", "Wrapped stETH", 18),
            erc20(AUSD_ADDRESS, "AUSD", "AUSD", 6),
            erc20(BBZ_ADDRESS, "BBZ", "Buri Buri Zeamon", 18),
            erc20(QUBOT_ADDRESS, "QUBOT", "Quantum Robot", 18),
        ])
    }

    #[must_use]
    pub fn tokens(&self) -> &[TokenDescriptor] {
        &self.tokens
    }

    #[must_use]
    pub fn by_symbol(&self, symbol: &str) -> Option<&TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    #[must_use]
    pub fn by_address(&self, address: Address) -> Option<&TokenDescriptor> {
        self.tokens.iter().find(|t| t.address == Some(address))
    }

    /// Resolves a user supplied identifier: a `0x` address or a symbol.
    pub fn resolve(&self, id: &str) -> Result<&TokenDescriptor> {
        let found = if id.starts_with("0x") {
            let address = Address::from_str(id)
                .map_err(|e| MegadromeError::TokenError(format!("Invalid address {id}: {e}")))?;
            self.by_address(address)
        } else {
            self.by_symbol(id)
        };

        found.ok_or_else(|| MegadromeError::TokenError(format!("Unknown token: {id}")))
    }

    /// Adds tokens whose address is not yet known. Returns how many were added.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = TokenDescriptor>) -> usize {
        let mut added = 0;
        for token in tokens {
            let known = match token.address {
                Some(address) => self.by_address(address).is_some(),
                None => self.tokens.iter().any(TokenDescriptor::is_native),
            };
            if known {
                debug!("Skipping already registered token {}", token.symbol);
                continue;
            }
            self.tokens.push(token);
            added += 1;
        }
        added
    }

    /// Fetches a JSON token list and merges the new entries.
    pub async fn extend_from_url(&mut self, client: &Client, url: &str) -> Result<usize> {
        let remote = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RemoteToken>>()
            .await?;

        let parsed = remote.into_iter().filter_map(|t| {
            let address = Address::from_str(t.address.as_deref()?).ok()?;
            let name = if t.name.is_empty() { t.symbol.clone() } else { t.name };
            Some(TokenDescriptor::erc20(address, &t.symbol, &name, t.decimals))
        });

        let added = self.extend(parsed.collect::<Vec<_>>());
        info!("Token list {} added {} tokens", url, added);
        Ok(added)
    }
}
