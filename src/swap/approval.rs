/*
 * ERC-20 allowance gate in front of the router
 */

use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use crate::dex::{ChainReader, ContractCall};
use crate::models::Result;
use crate::swap::intent::ExecutionKind;
use crate::tokens::TokenDescriptor;

/// The known allowance is below a positive amount. An unknown allowance
/// (no owner, or the read failed) never asks for approval.
#[must_use]
pub fn needs_approval(allowance: Option<U256>, amount_in: U256) -> bool {
    allowance.is_some_and(|allowance| !amount_in.is_zero() && allowance < amount_in)
}

pub struct ApprovalGate {
    reader: Arc<dyn ChainReader>,
    spender: Address,
    allowances: Mutex<HashMap<(Address, Address), U256>>,
}

impl ApprovalGate {
    pub fn new(reader: Arc<dyn ChainReader>, spender: Address) -> Self {
        Self {
            reader,
            spender,
            allowances: Mutex::new(HashMap::new()),
        }
    }

    /// Only ERC-20 inputs going through the router need an allowance.
    #[must_use]
    pub fn applies(token_in: &TokenDescriptor, kind: ExecutionKind) -> bool {
        !token_in.is_native() && token_in.address.is_some() && !kind.is_wrap()
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<(Address, Address), U256>> {
        match self.allowances.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn cached(&self, token: Address, owner: Address) -> Option<U256> {
        self.cache().get(&(token, owner)).copied()
    }

    /// Current allowance toward the router, from cache when available.
    /// `None` when the gate does not apply or the read failed.
    pub async fn allowance(
        &self,
        token_in: &TokenDescriptor,
        kind: ExecutionKind,
        owner: Option<Address>,
    ) -> Option<U256> {
        if !Self::applies(token_in, kind) {
            return None;
        }
        let (token, owner) = (token_in.address?, owner?);
        if let Some(cached) = self.cached(token, owner) {
            return Some(cached);
        }
        match self.refetch(token, owner).await {
            Ok(allowance) => Some(allowance),
            Err(e) => {
                warn!("Allowance read failed for {:?}: {}", token, e);
                None
            }
        }
    }

    pub async fn refetch(&self, token: Address, owner: Address) -> Result<U256> {
        let allowance = self.reader.allowance(token, owner, self.spender).await?;
        debug!("Allowance of {:?} for {:?}: {}", token, owner, allowance);
        self.cache().insert((token, owner), allowance);
        Ok(allowance)
    }

    /// Approval for exactly `amount`, never unlimited.
    #[must_use]
    pub fn approval_call(&self, token: Address, amount: U256) -> ContractCall {
        ContractCall::Approve {
            token,
            spender: self.spender,
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::intent::WrapDirection;
    use crate::swap::mock::MockChain;
    use crate::tokens::TokenRegistry;

    #[test]
    fn needs_approval_only_below_positive_amount() {
        let hundred = U256::from(100_000_000u64);
        assert!(needs_approval(Some(U256::zero()), hundred));
        assert!(!needs_approval(None, hundred));
        assert!(!needs_approval(Some(hundred), hundred));
        assert!(!needs_approval(Some(U256::zero()), U256::zero()));
        assert!(!needs_approval(None, U256::zero()));
    }

    #[test]
    fn gate_skips_native_and_wraps() {
        let registry = TokenRegistry::monad();
        let mon = registry.by_symbol("MON").unwrap();
        let wmon = registry.by_symbol("WMON").unwrap();
        assert!(!ApprovalGate::applies(mon, ExecutionKind::NativeIn));
        assert!(!ApprovalGate::applies(wmon, ExecutionKind::Wrap(WrapDirection::Unwrap)));
        assert!(ApprovalGate::applies(wmon, ExecutionKind::TokenToToken));
    }

    #[tokio::test]
    async fn reads_and_caches_allowance() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let owner = Address::repeat_byte(0xaa);
        let router = Address::repeat_byte(0x01);
        let chain = Arc::new(MockChain::default());
        chain.set_allowance(usdc.address.unwrap(), owner, router, U256::from(50u64));

        let gate = ApprovalGate::new(chain.clone(), router);
        let kind = ExecutionKind::TokenToToken;
        assert_eq!(gate.allowance(usdc, kind, Some(owner)).await, Some(U256::from(50u64)));
        assert_eq!(gate.allowance(usdc, kind, Some(owner)).await, Some(U256::from(50u64)));
        assert_eq!(chain.allowance_reads(), 1);
        assert_eq!(gate.allowance(usdc, kind, None).await, None);

        chain.set_allowance(usdc.address.unwrap(), owner, router, U256::from(80u64));
        assert_eq!(gate.refetch(usdc.address.unwrap(), owner).await.unwrap(), U256::from(80u64));
        assert_eq!(gate.cached(usdc.address.unwrap(), owner), Some(U256::from(80u64)));
    }

    #[tokio::test]
    async fn failed_read_is_not_cached() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let owner = Address::repeat_byte(0xaa);
        let chain = Arc::new(MockChain::default());
        let gate = ApprovalGate::new(chain.clone(), Address::repeat_byte(0x01));

        chain.fail_allowance_reads(true);
        assert_eq!(gate.allowance(usdc, ExecutionKind::TokenToToken, Some(owner)).await, None);
        assert_eq!(gate.cached(usdc.address.unwrap(), owner), None);

        chain.fail_allowance_reads(false);
        assert_eq!(
            gate.allowance(usdc, ExecutionKind::TokenToToken, Some(owner)).await,
            Some(U256::zero())
        );
        assert_eq!(chain.allowance_reads(), 2);
    }

    #[test]
    fn approval_is_exact_amount() {
        let router = Address::repeat_byte(0x01);
        let gate = ApprovalGate::new(Arc::new(MockChain::default()), router);
        let token = Address::repeat_byte(0x22);
        assert_eq!(
            gate.approval_call(token, U256::from(100_000_000u64)),
            ContractCall::Approve {
                token,
                spender: router,
                amount: U256::from(100_000_000u64),
            }
        );
    }
}
