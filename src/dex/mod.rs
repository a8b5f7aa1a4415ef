/*
 * DEX integration: the seams to the router, token and wallet collaborators
 */

pub mod solidly;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use crate::models::Result;

pub use solidly::{ContractCall, Route};

/// Read access to chain state.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn native_balance(&self, owner: Address) -> Result<U256>;
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;
    /// Router `getAmountsOut`; the last element is the realized output.
    async fn get_amounts_out(&self, router: Address, amount_in: U256, routes: &[Route]) -> Result<Vec<U256>>;
}

/// A connected wallet able to sign and submit transactions.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    fn account(&self) -> Address;
    /// Signs and broadcasts; resolves once the wallet hands back a hash.
    async fn submit(&self, call: &ContractCall) -> Result<H256>;
    /// Waits for `confirmations` blocks on top of the mined transaction.
    async fn wait_for_receipt(&self, hash: H256, confirmations: usize) -> Result<TxReceipt>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: H256,
    pub success: bool,
    /// Revert message when the transaction failed, if it could be recovered.
    pub revert_reason: Option<String>,
}
