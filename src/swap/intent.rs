/*
 * Swap intent: token pair, input amount and how the trade will execute
 */

use ethers::types::{Address, U256};
use serde::Serialize;
use std::time::{Duration, Instant};
use crate::tokens::TokenDescriptor;
use crate::utils::parse_units;

/// The typed input amount tracked twice.
///
/// * `raw` follows every edit and feeds the balance check and the
///   wrap/unwrap path, which never wait.
/// * `debounced` only catches up once no edit happened for `window`; it
///   feeds router quotes and router swaps.
#[derive(Debug, Clone)]
pub struct AmountInput {
    raw: String,
    debounced: String,
    last_edit: Option<Instant>,
    window: Duration,
}

impl AmountInput {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            raw: String::new(),
            debounced: String::new(),
            last_edit: None,
            window,
        }
    }

    pub fn set(&mut self, value: &str, now: Instant) {
        self.raw = value.to_string();
        self.last_edit = Some(now);
        if self.window.is_zero() {
            self.settle(now);
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn debounced(&self) -> &str {
        &self.debounced
    }

    /// When the pending edit becomes the debounced value, if one is pending.
    #[must_use]
    pub fn settles_at(&self) -> Option<Instant> {
        self.last_edit
            .filter(|_| self.raw != self.debounced)
            .map(|at| at + self.window)
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.raw == self.debounced
    }

    /// Promotes the raw value once the window has elapsed. Returns whether
    /// the debounced value changed.
    pub fn settle(&mut self, now: Instant) -> bool {
        match self.settles_at() {
            Some(at) if now >= at => {
                self.debounced = self.raw.clone();
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapDirection {
    /// native -> wrapped via `deposit`
    Wrap,
    /// wrapped -> native via `withdraw`
    Unwrap,
}

/// How an intent reaches the chain, resolved once per token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Wrap(WrapDirection),
    NativeIn,
    NativeOut,
    TokenToToken,
}

impl ExecutionKind {
    #[must_use]
    pub fn resolve(token_in: &TokenDescriptor, token_out: &TokenDescriptor, wrapped_native: Address) -> Self {
        let is_wrapped = |t: &TokenDescriptor| !t.is_native() && t.address == Some(wrapped_native);

        if token_in.is_native() && is_wrapped(token_out) {
            ExecutionKind::Wrap(WrapDirection::Wrap)
        } else if is_wrapped(token_in) && token_out.is_native() {
            ExecutionKind::Wrap(WrapDirection::Unwrap)
        } else if token_in.is_native() {
            ExecutionKind::NativeIn
        } else if token_out.is_native() {
            ExecutionKind::NativeOut
        } else {
            ExecutionKind::TokenToToken
        }
    }

    #[must_use]
    pub fn is_wrap(self) -> bool {
        matches!(self, ExecutionKind::Wrap(_))
    }
}

/// A pending user action with its amount already scaled to base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
    pub token_in: TokenDescriptor,
    pub token_out: TokenDescriptor,
    pub amount_in: String,
    pub amount_in_base: U256,
}

impl SwapIntent {
    #[must_use]
    pub fn new(token_in: TokenDescriptor, token_out: TokenDescriptor, amount_in: &str) -> Self {
        let amount_in_base = parse_units(amount_in, token_in.decimals);
        Self {
            token_in,
            token_out,
            amount_in: amount_in.to_string(),
            amount_in_base,
        }
    }

    #[must_use]
    pub fn kind(&self, wrapped_native: Address) -> ExecutionKind {
        ExecutionKind::resolve(&self.token_in, &self.token_out, wrapped_native)
    }

    /// Both sides route through the same address and this is not a wrap.
    #[must_use]
    pub fn is_same_token(&self, wrapped_native: Address) -> bool {
        !self.kind(wrapped_native).is_wrap()
            && self.token_in.routing_address(wrapped_native)
                == self.token_out.routing_address(wrapped_native)
    }
}
