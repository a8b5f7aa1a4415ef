/*
 * Balance resolution with per (token, account) caching
 */

use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use crate::dex::ChainReader;
use crate::tokens::TokenDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Holding {
    Native,
    Token(Address),
}

impl Holding {
    fn of(token: &TokenDescriptor) -> Option<Self> {
        if token.is_native() {
            Some(Holding::Native)
        } else {
            token.address.map(Holding::Token)
        }
    }
}

pub struct BalanceResolver {
    reader: Arc<dyn ChainReader>,
    cache: Mutex<HashMap<(Holding, Address), U256>>,
}

impl BalanceResolver {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self {
            reader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Spendable balance in base units. Zero when disconnected, when the
    /// token has no address, or when the read fails.
    pub async fn balance(&self, token: &TokenDescriptor, account: Option<Address>) -> U256 {
        let (Some(account), Some(holding)) = (account, Holding::of(token)) else {
            return U256::zero();
        };
        if let Some(cached) = self.cached(holding, account) {
            return cached;
        }
        self.fetch(holding, account).await
    }

    /// Drops the cached value and reads it again.
    pub async fn refetch(&self, token: &TokenDescriptor, account: Option<Address>) -> U256 {
        let (Some(account), Some(holding)) = (account, Holding::of(token)) else {
            return U256::zero();
        };
        self.lock().remove(&(holding, account));
        self.fetch(holding, account).await
    }

    fn cached(&self, holding: Holding, account: Address) -> Option<U256> {
        self.lock().get(&(holding, account)).copied()
    }

    async fn fetch(&self, holding: Holding, account: Address) -> U256 {
        let result = match holding {
            Holding::Native => self.reader.native_balance(account).await,
            Holding::Token(token) => self.reader.token_balance(token, account).await,
        };

        match result {
            Ok(balance) => {
                debug!("Balance {:?} for {:?}: {}", holding, account, balance);
                self.lock().insert((holding, account), balance);
                balance
            }
            Err(e) => {
                warn!("Balance read failed for {:?}: {}", holding, e);
                U256::zero()
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Holding, Address), U256>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::mock::MockChain;
    use crate::tokens::TokenRegistry;

    #[tokio::test]
    async fn resolves_native_and_erc20() {
        let registry = TokenRegistry::monad();
        let mon = registry.by_symbol("MON").unwrap();
        let usdc = registry.by_symbol("USDC").unwrap();
        let owner = Address::repeat_byte(0xaa);

        let chain = Arc::new(MockChain::default());
        chain.set_native_balance(owner, U256::from(7u64));
        chain.set_token_balance(usdc.address.unwrap(), owner, U256::from(9u64));

        let resolver = BalanceResolver::new(chain.clone());
        assert_eq!(resolver.balance(mon, Some(owner)).await, U256::from(7u64));
        assert_eq!(resolver.balance(usdc, Some(owner)).await, U256::from(9u64));
        assert_eq!(resolver.balance(usdc, None).await, U256::zero());
    }

    #[tokio::test]
    async fn caches_until_refetched() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let owner = Address::repeat_byte(0xaa);
        let chain = Arc::new(MockChain::default());
        chain.set_token_balance(usdc.address.unwrap(), owner, U256::from(1u64));

        let resolver = BalanceResolver::new(chain.clone());
        assert_eq!(resolver.balance(usdc, Some(owner)).await, U256::from(1u64));

        chain.set_token_balance(usdc.address.unwrap(), owner, U256::from(2u64));
        assert_eq!(resolver.balance(usdc, Some(owner)).await, U256::from(1u64));
        assert_eq!(resolver.refetch(usdc, Some(owner)).await, U256::from(2u64));
        assert_eq!(chain.balance_reads(), 2);
    }

    #[tokio::test]
    async fn read_failure_is_zero_and_not_cached() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let owner = Address::repeat_byte(0xaa);
        let chain = Arc::new(MockChain::default());
        chain.fail_balance_reads(true);

        let resolver = BalanceResolver::new(chain.clone());
        assert!(resolver.balance(usdc, Some(owner)).await.is_zero());

        chain.fail_balance_reads(false);
        chain.set_token_balance(usdc.address.unwrap(), owner, U256::from(3u64));
        assert_eq!(resolver.balance(usdc, Some(owner)).await, U256::from(3u64));
    }
}
