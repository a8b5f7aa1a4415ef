/*
 * Data models, error types and the transaction error taxonomy
 */

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub amount_out: String,
    pub minimum_received: String,
    pub exchange_rate: Decimal,
    pub price_impact_percent: Decimal,
    pub route_is_stable: bool,
    pub is_wrap: bool,
    pub slippage_percent: Decimal,
}

/// What the swap action button should show. `Ready` and `ApprovalRequired`
/// are the only states in which an execution may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    ConnectWallet,
    SelectToken,
    SelectDifferentTokens,
    EnterAmount,
    InsufficientBalance,
    FetchingQuote,
    NoQuote,
    InFlight,
    ApprovalRequired,
    Ready,
}

impl SwapStatus {
    #[must_use]
    pub fn can_swap(self) -> bool {
        matches!(self, SwapStatus::Ready | SwapStatus::ApprovalRequired)
    }
}

/// Classification of every transaction failure surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxErrorKind {
    UserRejected,
    InsufficientGas,
    SlippageExceeded,
    DeadlineExpired,
    InsufficientLiquidity,
    Unknown,
}

impl TxErrorKind {
    /// Maps a raw wallet, node or revert message onto a kind.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.contains("user rejected") || message.contains("User denied") {
            TxErrorKind::UserRejected
        } else if message.contains("insufficient funds") {
            TxErrorKind::InsufficientGas
        } else if message.contains("INSUFFICIENT_OUTPUT_AMOUNT") {
            TxErrorKind::SlippageExceeded
        } else if message.contains("EXPIRED") {
            TxErrorKind::DeadlineExpired
        } else if message.contains("INSUFFICIENT_LIQUIDITY") {
            TxErrorKind::InsufficientLiquidity
        } else {
            TxErrorKind::Unknown
        }
    }

    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            TxErrorKind::UserRejected => "Transaction rejected by user",
            TxErrorKind::InsufficientGas => "Insufficient funds for gas",
            TxErrorKind::SlippageExceeded => "Price moved unfavorably. Try increasing slippage.",
            TxErrorKind::DeadlineExpired => "Transaction expired. Please try again.",
            TxErrorKind::InsufficientLiquidity => "Insufficient liquidity for this trade.",
            TxErrorKind::Unknown => "Transaction failed. Please try again.",
        }
    }

    /// Whether resubmitting the same trade can succeed. Liquidity failures
    /// need a different amount or route.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, TxErrorKind::InsufficientLiquidity)
    }
}

#[derive(Debug, Error)]
pub enum MegadromeError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract interaction error: {0}")]
    ContractError(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("{}", .kind.user_message())]
    Transaction { kind: TxErrorKind, message: String },

    #[error("Swap not ready: {0:?}")]
    NotReady(SwapStatus),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl MegadromeError {
    /// Builds a classified transaction error from a raw failure message.
    pub fn transaction(message: impl Into<String>) -> Self {
        let message = message.into();
        MegadromeError::Transaction {
            kind: TxErrorKind::classify(&message),
            message,
        }
    }

    /// The transaction kind of this error, when it came from a wallet or chain write.
    #[must_use]
    pub fn tx_kind(&self) -> Option<TxErrorKind> {
        match self {
            MegadromeError::Transaction { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MegadromeError>;
