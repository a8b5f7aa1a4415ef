/*
 * In-memory chain and wallet used by the engine tests
 */

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::dex::{ChainReader, ContractCall, Route, TransactionSender, TxReceipt};
use crate::models::{MegadromeError, Result};

#[derive(Default)]
pub struct MockChain {
    native: Mutex<HashMap<Address, U256>>,
    tokens: Mutex<HashMap<(Address, Address), U256>>,
    allowances: Mutex<HashMap<(Address, Address, Address), U256>>,
    quotes: Mutex<HashMap<(bool, Option<U256>), std::result::Result<U256, String>>>,
    delays: Mutex<HashMap<U256, Duration>>,
    quote_calls: Mutex<Vec<(U256, Route)>>,
    balance_reads: AtomicUsize,
    allowance_reads: AtomicUsize,
    fail_balances: AtomicBool,
    fail_allowances: AtomicBool,
}

impl MockChain {
    pub fn set_native_balance(&self, owner: Address, amount: U256) {
        self.native.lock().unwrap().insert(owner, amount);
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) {
        self.tokens.lock().unwrap().insert((token, owner), amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances
            .lock()
            .unwrap()
            .insert((token, owner, spender), amount);
    }

    /// Output of a route for any input (`amount = None`) or for an exact input.
    pub fn set_quote(&self, stable: bool, amount: Option<U256>, out: std::result::Result<U256, &str>) {
        self.quotes
            .lock()
            .unwrap()
            .insert((stable, amount), out.map_err(str::to_string));
    }

    pub fn set_quote_delay(&self, amount: U256, delay: Duration) {
        self.delays.lock().unwrap().insert(amount, delay);
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.fail_balances.store(fail, Ordering::SeqCst);
    }

    pub fn fail_allowance_reads(&self, fail: bool) {
        self.fail_allowances.store(fail, Ordering::SeqCst);
    }

    pub fn quote_calls(&self) -> Vec<(U256, Route)> {
        self.quote_calls.lock().unwrap().clone()
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    pub fn allowance_reads(&self) -> usize {
        self.allowance_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn native_balance(&self, owner: Address) -> Result<U256> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(MegadromeError::RpcError("node down".to_string()));
        }
        Ok(self.native.lock().unwrap().get(&owner).copied().unwrap_or_default())
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(MegadromeError::RpcError("node down".to_string()));
        }
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.allowance_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_allowances.load(Ordering::SeqCst) {
            return Err(MegadromeError::RpcError("node down".to_string()));
        }
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn get_amounts_out(&self, _router: Address, amount_in: U256, routes: &[Route]) -> Result<Vec<U256>> {
        let route = routes[0];
        self.quote_calls.lock().unwrap().push((amount_in, route));

        let delay = self.delays.lock().unwrap().get(&amount_in).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rule = {
            let quotes = self.quotes.lock().unwrap();
            quotes
                .get(&(route.stable, Some(amount_in)))
                .or_else(|| quotes.get(&(route.stable, None)))
                .cloned()
        };
        match rule {
            Some(Ok(out)) => Ok(vec![amount_in, out]),
            Some(Err(msg)) => Err(MegadromeError::ContractError(msg)),
            None => Err(MegadromeError::ContractError("execution reverted".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Submitted(ContractCall),
    Confirmed(H256),
}

pub struct MockWallet {
    account: Address,
    chain: Arc<MockChain>,
    nonce: AtomicU64,
    events: Mutex<Vec<WalletEvent>>,
    sent: Mutex<HashMap<H256, ContractCall>>,
    submit_errors: Mutex<HashMap<&'static str, String>>,
    reverts: Mutex<HashMap<&'static str, String>>,
}

impl MockWallet {
    pub fn new(account: Address, chain: Arc<MockChain>) -> Self {
        Self {
            account,
            chain,
            nonce: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
            sent: Mutex::new(HashMap::new()),
            submit_errors: Mutex::new(HashMap::new()),
            reverts: Mutex::new(HashMap::new()),
        }
    }

    /// Makes submitting `function` fail with a wallet-level error.
    pub fn fail_submit(&self, function: &'static str, message: &str) {
        self.submit_errors
            .lock()
            .unwrap()
            .insert(function, message.to_string());
    }

    /// Makes `function` mine but revert with `reason`.
    pub fn revert(&self, function: &'static str, reason: &str) {
        self.reverts.lock().unwrap().insert(function, reason.to_string());
    }

    pub fn clear_failures(&self) {
        self.submit_errors.lock().unwrap().clear();
        self.reverts.lock().unwrap().clear();
    }

    pub fn events(&self) -> Vec<WalletEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<ContractCall> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WalletEvent::Submitted(call) => Some(call),
                WalletEvent::Confirmed(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl TransactionSender for MockWallet {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit(&self, call: &ContractCall) -> Result<H256> {
        let failure = self.submit_errors.lock().unwrap().get(call.function_name()).cloned();
        if let Some(message) = failure {
            return Err(MegadromeError::transaction(message));
        }

        let hash = H256::from_low_u64_be(self.nonce.fetch_add(1, Ordering::SeqCst));
        self.events
            .lock()
            .unwrap()
            .push(WalletEvent::Submitted(call.clone()));
        self.sent.lock().unwrap().insert(hash, call.clone());
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: H256, _confirmations: usize) -> Result<TxReceipt> {
        tokio::task::yield_now().await;
        self.events.lock().unwrap().push(WalletEvent::Confirmed(hash));

        let call = self.sent.lock().unwrap().get(&hash).cloned();
        let Some(call) = call else {
            return Err(MegadromeError::RpcError("unknown hash".to_string()));
        };

        let revert = self.reverts.lock().unwrap().get(call.function_name()).cloned();
        if let Some(reason) = revert {
            return Ok(TxReceipt {
                hash,
                success: false,
                revert_reason: Some(reason),
            });
        }

        if let ContractCall::Approve { token, spender, amount } = call {
            self.chain.set_allowance(token, self.account, spender, amount);
        }
        Ok(TxReceipt {
            hash,
            success: true,
            revert_reason: None,
        })
    }
}
