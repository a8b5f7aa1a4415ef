/*
 * Calldata encoding for the router, ERC-20 and wrapped-native contracts
 */

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;
use serde::Serialize;
use super::types::{routes_token, Route};
use crate::models::{MegadromeError, Result};

pub const GET_AMOUNTS_OUT: &str = "getAmountsOut(uint256,(address,address,bool,address)[])";
pub const SWAP_EXACT_TOKENS_FOR_TOKENS: &str =
    "swapExactTokensForTokens(uint256,uint256,(address,address,bool,address)[],address,uint256)";
pub const SWAP_EXACT_ETH_FOR_TOKENS: &str =
    "swapExactETHForTokens(uint256,(address,address,bool,address)[],address,uint256)";
pub const SWAP_EXACT_TOKENS_FOR_ETH: &str =
    "swapExactTokensForETH(uint256,uint256,(address,address,bool,address)[],address,uint256)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const ALLOWANCE: &str = "allowance(address,address)";
pub const APPROVE: &str = "approve(address,uint256)";
pub const DEPOSIT: &str = "deposit()";
pub const WITHDRAW: &str = "withdraw(uint256)";

#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn with_selector(signature: &str, params: &[Token]) -> Bytes {
    let mut call_data = Vec::from(selector(signature));
    call_data.extend_from_slice(&encode(params));
    Bytes::from(call_data)
}

#[must_use]
pub fn encode_get_amounts_out(amount_in: U256, routes: &[Route]) -> Bytes {
    with_selector(GET_AMOUNTS_OUT, &[Token::Uint(amount_in), routes_token(routes)])
}

#[must_use]
pub fn encode_balance_of(owner: Address) -> Bytes {
    with_selector(BALANCE_OF, &[Token::Address(owner)])
}

#[must_use]
pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    with_selector(ALLOWANCE, &[Token::Address(owner), Token::Address(spender)])
}

/// Decodes a `uint256[]` return value.
pub fn decode_amounts(data: &[u8]) -> Result<Vec<U256>> {
    let tokens = decode(&[ParamType::Array(Box::new(ParamType::Uint(256)))], data)
        .map_err(|e| MegadromeError::ContractError(format!("Invalid amounts response: {e}")))?;

    match tokens.into_iter().next() {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|t| {
                t.into_uint().ok_or_else(|| {
                    MegadromeError::ContractError("Non-integer entry in amounts".to_string())
                })
            })
            .collect(),
        _ => Err(MegadromeError::ContractError(
            "Invalid amounts response - expected array".to_string(),
        )),
    }
}

/// Decodes a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    if data.len() < 32 {
        return Err(MegadromeError::ContractError(
            "Invalid uint response - insufficient data".to_string(),
        ));
    }
    Ok(U256::from_big_endian(&data[0..32]))
}

/// Every state-changing call the engine can submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "function", rename_all = "camelCase")]
pub enum ContractCall {
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Deposit {
        wrapped: Address,
        value: U256,
    },
    Withdraw {
        wrapped: Address,
        amount: U256,
    },
    SwapExactEthForTokens {
        router: Address,
        value: U256,
        amount_out_min: U256,
        routes: Vec<Route>,
        recipient: Address,
        deadline: U256,
    },
    SwapExactTokensForEth {
        router: Address,
        amount_in: U256,
        amount_out_min: U256,
        routes: Vec<Route>,
        recipient: Address,
        deadline: U256,
    },
    SwapExactTokensForTokens {
        router: Address,
        amount_in: U256,
        amount_out_min: U256,
        routes: Vec<Route>,
        recipient: Address,
        deadline: U256,
    },
}

impl ContractCall {
    /// Contract the transaction is sent to.
    #[must_use]
    pub fn to(&self) -> Address {
        match self {
            ContractCall::Approve { token, .. } => *token,
            ContractCall::Deposit { wrapped, .. } | ContractCall::Withdraw { wrapped, .. } => *wrapped,
            ContractCall::SwapExactEthForTokens { router, .. }
            | ContractCall::SwapExactTokensForEth { router, .. }
            | ContractCall::SwapExactTokensForTokens { router, .. } => *router,
        }
    }

    /// Native value attached to the transaction.
    #[must_use]
    pub fn value(&self) -> U256 {
        match self {
            ContractCall::Deposit { value, .. } | ContractCall::SwapExactEthForTokens { value, .. } => *value,
            _ => U256::zero(),
        }
    }

    #[must_use]
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::Approve { .. } => "approve",
            ContractCall::Deposit { .. } => "deposit",
            ContractCall::Withdraw { .. } => "withdraw",
            ContractCall::SwapExactEthForTokens { .. } => "swapExactETHForTokens",
            ContractCall::SwapExactTokensForEth { .. } => "swapExactTokensForETH",
            ContractCall::SwapExactTokensForTokens { .. } => "swapExactTokensForTokens",
        }
    }

    #[must_use]
    pub fn calldata(&self) -> Bytes {
        match self {
            ContractCall::Approve { spender, amount, .. } => {
                with_selector(APPROVE, &[Token::Address(*spender), Token::Uint(*amount)])
            }
            ContractCall::Deposit { .. } => with_selector(DEPOSIT, &[]),
            ContractCall::Withdraw { amount, .. } => with_selector(WITHDRAW, &[Token::Uint(*amount)]),
            ContractCall::SwapExactEthForTokens {
                amount_out_min,
                routes,
                recipient,
                deadline,
                ..
            } => with_selector(
                SWAP_EXACT_ETH_FOR_TOKENS,
                &[
                    Token::Uint(*amount_out_min),
                    routes_token(routes),
                    Token::Address(*recipient),
                    Token::Uint(*deadline),
                ],
            ),
            ContractCall::SwapExactTokensForEth {
                amount_in,
                amount_out_min,
                routes,
                recipient,
                deadline,
                ..
            } => with_selector(
                SWAP_EXACT_TOKENS_FOR_ETH,
                &[
                    Token::Uint(*amount_in),
                    Token::Uint(*amount_out_min),
                    routes_token(routes),
                    Token::Address(*recipient),
                    Token::Uint(*deadline),
                ],
            ),
            ContractCall::SwapExactTokensForTokens {
                amount_in,
                amount_out_min,
                routes,
                recipient,
                deadline,
                ..
            } => with_selector(
                SWAP_EXACT_TOKENS_FOR_TOKENS,
                &[
                    Token::Uint(*amount_in),
                    Token::Uint(*amount_out_min),
                    routes_token(routes),
                    Token::Address(*recipient),
                    Token::Uint(*deadline),
                ],
            ),
        }
    }
}
