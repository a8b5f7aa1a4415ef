/*
 * RPC clients for reading Monad state and submitting wallet transactions
 */

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockId, BlockNumber, Bytes, TransactionRequest, H256, U256, U64};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::dex::solidly::{
    decode_amounts, decode_uint, encode_allowance, encode_balance_of, encode_get_amounts_out,
};
use crate::dex::{ChainReader, ContractCall, Route, TransactionSender, TxReceipt};
use crate::models::{MegadromeError, Result};

pub struct RpcClient {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
}

impl RpcClient {
    pub async fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| MegadromeError::RpcError(format!("Failed to create provider: {e}")))?;

        let chain = provider
            .get_chainid()
            .await
            .map_err(|e| MegadromeError::RpcError(format!("Failed to get chain ID: {e}")))?;

        if chain.as_u64() != chain_id {
            return Err(MegadromeError::RpcError(format!(
                "Chain ID mismatch: expected {}, got {}",
                chain_id,
                chain.as_u64()
            )));
        }

        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
        })
    }

    #[must_use]
    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes, what: &str) -> Result<Bytes> {
        let tx = TransactionRequest::new().to(to).data(data);

        self.provider
            .call(&tx.into(), None)
            .await
            .map_err(|e| MegadromeError::ContractError(format!("Failed to call {what}: {e}")))
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn native_balance(&self, owner: Address) -> Result<U256> {
        self.provider
            .get_balance(owner, None)
            .await
            .map_err(|e| MegadromeError::RpcError(format!("Failed to get balance: {e}")))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let result = self.call(token, encode_balance_of(owner), "balanceOf").await?;
        decode_uint(&result)
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let result = self
            .call(token, encode_allowance(owner, spender), "allowance")
            .await?;
        decode_uint(&result)
    }

    async fn get_amounts_out(&self, router: Address, amount_in: U256, routes: &[Route]) -> Result<Vec<U256>> {
        let result = self
            .call(router, encode_get_amounts_out(amount_in, routes), "getAmountsOut")
            .await?;
        decode_amounts(&result)
    }
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Wallet backed by a local private key.
pub struct WalletClient {
    client: Arc<SignerClient>,
    account: Address,
}

impl WalletClient {
    pub fn new(rpc: &RpcClient, private_key: &str) -> Result<Self> {
        let wallet = LocalWallet::from_str(private_key.trim().trim_start_matches("0x"))
            .map_err(|e| MegadromeError::ConfigError(format!("Invalid private key: {e}")))?
            .with_chain_id(rpc.chain_id());
        let account = wallet.address();
        info!("Wallet loaded for account {:?}", account);

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(rpc.provider().as_ref().clone(), wallet)),
            account,
        })
    }

    /// Replays a reverted transaction at its block to recover the revert message.
    async fn revert_reason(&self, hash: H256, block: Option<U64>) -> Option<String> {
        let tx = self.client.get_transaction(hash).await.ok().flatten()?;
        let mut replay = TransactionRequest::new()
            .from(tx.from)
            .data(tx.input.clone())
            .value(tx.value);
        if let Some(to) = tx.to {
            replay = replay.to(to);
        }
        let at = block.map(|n| BlockId::Number(BlockNumber::Number(n)));

        match self.client.provider().call(&replay.into(), at).await {
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

#[async_trait]
impl TransactionSender for WalletClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit(&self, call: &ContractCall) -> Result<H256> {
        let tx = TransactionRequest::new()
            .from(self.account)
            .to(call.to())
            .data(call.calldata())
            .value(call.value());

        debug!("Submitting {} to {:?}", call.function_name(), call.to());
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| MegadromeError::transaction(e.to_string()))?;

        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(&self, hash: H256, confirmations: usize) -> Result<TxReceipt> {
        let receipt = PendingTransaction::new(hash, self.client.provider())
            .confirmations(confirmations)
            .await
            .map_err(|e| MegadromeError::RpcError(format!("Failed waiting for {hash:?}: {e}")))?
            .ok_or_else(|| MegadromeError::transaction(format!("Transaction {hash:?} was dropped")))?;

        let success = receipt.status == Some(U64::one());
        let revert_reason = if success {
            None
        } else {
            let reason = self.revert_reason(hash, receipt.block_number).await;
            warn!("Transaction {:?} reverted: {:?}", hash, reason);
            reason
        };

        Ok(TxReceipt {
            hash,
            success,
            revert_reason,
        })
    }
}
