/*
 * Per-user swap session: token pair, amount, derived quote and action state
 */

use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use crate::config::ContractAddresses;
use crate::dex::{ChainReader, TransactionSender, TxReceipt};
use crate::metrics::SwapMetrics;
use crate::models::{MegadromeError, Result, SwapStatus};
use crate::settings::SettingsStore;
use crate::swap::approval::{needs_approval, ApprovalGate};
use crate::swap::balance::BalanceResolver;
use crate::swap::intent::{AmountInput, ExecutionKind};
use crate::swap::orchestrator::{ExecutionDeps, SwapPlan, TransactionOrchestrator, TxFailure};
use crate::swap::quoter::{DualRouteQuoter, Quote, QuoteKey, QuoteOutcome};
use crate::tokens::TokenDescriptor;
use crate::utils::{format_units, parse_units};

/// Snapshot of everything a swap form renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapView {
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: String,
    pub amount_in_base: U256,
    /// Human units, empty when there is no output.
    pub amount_out: String,
    pub quoted_amount_out: U256,
    pub exchange_rate: Decimal,
    pub price_impact: Decimal,
    pub route_is_stable: bool,
    pub is_wrap: bool,
    pub is_loading: bool,
    pub quote_error: Option<String>,
    pub needs_approval: bool,
    pub insufficient_balance: bool,
    pub balance_in: String,
    pub balance_out: String,
    pub status: SwapStatus,
    pub can_swap: bool,
    pub is_approving: bool,
    pub is_swapping: bool,
    pub error: Option<TxFailure>,
    pub last_tx_hash: Option<H256>,
}

/// A quote for unchanged inputs is reused for this long.
pub const QUOTE_STALE_AFTER: Duration = Duration::from_secs(10);

fn human_or_empty(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        String::new()
    } else {
        format_units(amount, decimals)
    }
}

pub struct SwapSession {
    account: Option<Address>,
    contracts: ContractAddresses,
    settings: Arc<SettingsStore>,
    balances: BalanceResolver,
    quoter: DualRouteQuoter,
    approvals: ApprovalGate,
    orchestrator: Option<TransactionOrchestrator>,
    token_in: Option<TokenDescriptor>,
    token_out: Option<TokenDescriptor>,
    amount: AmountInput,
    balance_in: U256,
    balance_out: U256,
    allowance: Option<U256>,
    quote: Quote,
    quoted_for: Option<QuoteKey>,
    quoted_at: Option<Instant>,
}

impl SwapSession {
    /// A session without a wallet is read-only: it quotes but never reports
    /// balances or lets a swap start.
    pub fn new(
        reader: Arc<dyn ChainReader>,
        wallet: Option<Arc<dyn TransactionSender>>,
        contracts: ContractAddresses,
        settings: Arc<SettingsStore>,
        metrics: Arc<SwapMetrics>,
        debounce: Duration,
    ) -> Self {
        let account = wallet.as_ref().map(|w| w.account());
        Self {
            account,
            contracts,
            settings,
            balances: BalanceResolver::new(reader.clone()),
            quoter: DualRouteQuoter::new(reader.clone(), contracts, metrics.clone()),
            approvals: ApprovalGate::new(reader, contracts.router),
            orchestrator: wallet.map(|w| TransactionOrchestrator::new(w, metrics)),
            token_in: None,
            token_out: None,
            amount: AmountInput::new(debounce),
            balance_in: U256::zero(),
            balance_out: U256::zero(),
            allowance: None,
            quote: Quote::default(),
            quoted_for: None,
            quoted_at: None,
        }
    }

    #[must_use]
    pub fn account(&self) -> Option<Address> {
        self.account
    }

    /// Changing either token drops the current quote and every request in flight.
    pub fn select_tokens(&mut self, token_in: Option<TokenDescriptor>, token_out: Option<TokenDescriptor>) {
        info!(
            "Selected {} -> {}",
            token_in.as_ref().map_or("-", |t| t.symbol.as_str()),
            token_out.as_ref().map_or("-", |t| t.symbol.as_str()),
        );
        self.token_in = token_in;
        self.token_out = token_out;
        self.quoter.invalidate();
        self.quote = Quote::default();
        self.quoted_for = None;
        self.quoted_at = None;
        self.allowance = None;
        self.balance_in = U256::zero();
        self.balance_out = U256::zero();
    }

    pub fn set_amount_in(&mut self, value: &str) {
        self.set_amount_in_at(value, Instant::now());
    }

    pub fn set_amount_in_at(&mut self, value: &str, now: Instant) {
        self.amount.set(value, now);
    }

    /// Promotes the raw amount if the debounce window has elapsed at `now`.
    pub fn settle_at(&mut self, now: Instant) -> bool {
        self.amount.settle(now)
    }

    /// Sleeps until the pending edit settles.
    pub async fn wait_for_debounce(&mut self) {
        if let Some(at) = self.amount.settles_at() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
        }
        self.amount.settle(Instant::now());
    }

    fn kind(&self) -> Option<ExecutionKind> {
        match (&self.token_in, &self.token_out) {
            (Some(token_in), Some(token_out)) => Some(ExecutionKind::resolve(
                token_in,
                token_out,
                self.contracts.wrapped_native,
            )),
            _ => None,
        }
    }

    fn is_wrap(&self) -> bool {
        self.kind().is_some_and(ExecutionKind::is_wrap)
    }

    fn is_same_token(&self) -> bool {
        match (&self.token_in, &self.token_out) {
            (Some(token_in), Some(token_out)) => {
                !self.is_wrap()
                    && token_in.routing_address(self.contracts.wrapped_native)
                        == token_out.routing_address(self.contracts.wrapped_native)
            }
            _ => false,
        }
    }

    /// Raw amount in base units; reflects every keystroke.
    #[must_use]
    pub fn amount_in_base(&self) -> U256 {
        self.token_in
            .as_ref()
            .map_or_else(U256::zero, |t| parse_units(self.amount.raw(), t.decimals))
    }

    fn debounced_amount_base(&self) -> U256 {
        self.token_in
            .as_ref()
            .map_or_else(U256::zero, |t| parse_units(self.amount.debounced(), t.decimals))
    }

    fn current_key(&self) -> Option<QuoteKey> {
        let (token_in, token_out) = (self.token_in.as_ref()?, self.token_out.as_ref()?);
        Some(QuoteKey {
            from: token_in.routing_address(self.contracts.wrapped_native),
            to: token_out.routing_address(self.contracts.wrapped_native),
            amount_in: self.debounced_amount_base(),
        })
    }

    /// Re-reads balances, allowance and the quote concurrently.
    pub async fn refresh(&mut self) {
        let (Some(token_in), Some(token_out), Some(kind)) =
            (self.token_in.clone(), self.token_out.clone(), self.kind())
        else {
            self.quote = Quote::default();
            self.quoted_for = None;
            self.quoted_at = None;
            return;
        };
        let account = self.account;
        let raw_base = self.amount_in_base();
        let debounced_base = self.debounced_amount_base();
        let reuse_quote = !kind.is_wrap() && self.has_fresh_quote();

        let quote_future = async {
            if kind.is_wrap() {
                Some(Quote::wrap(raw_base))
            } else if reuse_quote {
                None
            } else {
                match self.quoter.quote(&token_in, &token_out, debounced_base).await {
                    QuoteOutcome::Fresh(quote) => Some(quote),
                    QuoteOutcome::Stale => None,
                }
            }
        };

        let (balance_in, balance_out, allowance, quote) = tokio::join!(
            self.balances.balance(&token_in, account),
            self.balances.balance(&token_out, account),
            self.approvals.allowance(&token_in, kind, account),
            quote_future,
        );

        self.balance_in = balance_in;
        self.balance_out = balance_out;
        self.allowance = allowance;
        if let Some(quote) = quote {
            debug!("Quote for {} {}: {}", debounced_base, token_in.symbol, quote.amount_out);
            self.quoted_for = if kind.is_wrap() { None } else { self.current_key() };
            self.quoted_at = Some(Instant::now());
            self.quote = quote;
        }
    }

    /// Edits that leave the debounced amount alone keep the current quote.
    fn has_fresh_quote(&self) -> bool {
        !self.quote.is_loading
            && self.quoted_for.is_some()
            && self.quoted_for == self.current_key()
            && self.quoted_at.is_some_and(|at| at.elapsed() < QUOTE_STALE_AFTER)
    }

    #[must_use]
    pub fn quote(&self) -> &Quote {
        &self.quote
    }

    fn approval_applies(&self) -> bool {
        match (&self.token_in, self.kind()) {
            (Some(token_in), Some(kind)) => self.account.is_some() && ApprovalGate::applies(token_in, kind),
            _ => false,
        }
    }

    #[must_use]
    pub fn needs_approval(&self) -> bool {
        self.approval_applies() && needs_approval(self.allowance, self.amount_in_base())
    }

    /// The allowance matters for this trade but has not been read yet.
    fn allowance_unknown(&self) -> bool {
        self.approval_applies() && self.allowance.is_none()
    }

    #[must_use]
    pub fn insufficient_balance(&self) -> bool {
        self.account.is_some() && self.amount_in_base() > self.balance_in
    }

    fn quote_is_current(&self) -> bool {
        self.amount.is_settled() && !self.quote.is_loading && self.quoted_for == self.current_key()
    }

    /// Recomputed from current state on every call.
    #[must_use]
    pub fn status(&self) -> SwapStatus {
        if self.token_in.is_none() || self.token_out.is_none() {
            return SwapStatus::SelectToken;
        }
        if self.is_same_token() {
            return SwapStatus::SelectDifferentTokens;
        }
        if self.amount_in_base().is_zero() {
            return SwapStatus::EnterAmount;
        }
        if self.account.is_none() {
            return SwapStatus::ConnectWallet;
        }
        if self.orchestrator.as_ref().is_some_and(TransactionOrchestrator::is_in_flight) {
            return SwapStatus::InFlight;
        }
        if self.insufficient_balance() {
            return SwapStatus::InsufficientBalance;
        }
        if self.is_wrap() {
            return SwapStatus::Ready;
        }
        if !self.quote_is_current() || self.allowance_unknown() {
            return SwapStatus::FetchingQuote;
        }
        if self.quote.amount_out.is_zero() {
            return SwapStatus::NoQuote;
        }
        if self.needs_approval() {
            return SwapStatus::ApprovalRequired;
        }
        SwapStatus::Ready
    }

    #[must_use]
    pub fn can_swap(&self) -> bool {
        self.status().can_swap()
    }

    #[must_use]
    pub fn error(&self) -> Option<TxFailure> {
        self.orchestrator.as_ref().and_then(TransactionOrchestrator::error)
    }

    pub fn clear_error(&self) {
        if let Some(orchestrator) = &self.orchestrator {
            orchestrator.clear_error();
        }
    }

    #[must_use]
    pub fn last_tx_hash(&self) -> Option<H256> {
        self.orchestrator.as_ref().and_then(TransactionOrchestrator::last_tx_hash)
    }

    #[must_use]
    pub fn view(&self) -> SwapView {
        let decimals_in = self.token_in.as_ref().map_or(0, |t| t.decimals);
        let decimals_out = self.token_out.as_ref().map_or(0, |t| t.decimals);
        let status = self.status();
        let (is_approving, is_swapping) = self
            .orchestrator
            .as_ref()
            .map_or((false, false), |o| (o.is_approving(), o.is_swapping()));

        SwapView {
            token_in: self.token_in.as_ref().map(|t| t.symbol.clone()),
            token_out: self.token_out.as_ref().map(|t| t.symbol.clone()),
            amount_in: self.amount.raw().to_string(),
            amount_in_base: self.amount_in_base(),
            amount_out: human_or_empty(self.quote.amount_out, decimals_out),
            quoted_amount_out: self.quote.amount_out,
            exchange_rate: self.quote.exchange_rate,
            price_impact: self.quote.price_impact,
            route_is_stable: self.quote.route_is_stable,
            is_wrap: self.is_wrap(),
            is_loading: self.quote.is_loading || !self.amount.is_settled(),
            quote_error: self.quote.error.clone(),
            needs_approval: self.needs_approval(),
            insufficient_balance: self.insufficient_balance(),
            balance_in: format_units(self.balance_in, decimals_in),
            balance_out: format_units(self.balance_out, decimals_out),
            status,
            can_swap: status.can_swap(),
            is_approving,
            is_swapping,
            error: self.error(),
            last_tx_hash: self.last_tx_hash(),
        }
    }

    /// Approves exactly the current input amount.
    pub async fn approve(&mut self) -> Result<TxReceipt> {
        let orchestrator = self
            .orchestrator
            .as_ref()
            .ok_or(MegadromeError::NotReady(SwapStatus::ConnectWallet))?;
        let token_in = self
            .token_in
            .as_ref()
            .ok_or(MegadromeError::NotReady(SwapStatus::SelectToken))?;

        let receipt = orchestrator
            .approve(&self.approvals, token_in, self.amount_in_base())
            .await?;
        if let (Some(token), Some(owner)) = (token_in.address, self.account) {
            self.allowance = self.approvals.cached(token, owner);
        }
        Ok(receipt)
    }

    /// Runs approve (if needed) then the swap or wrap for the current state.
    pub async fn execute(&mut self) -> Result<TxReceipt> {
        let status = self.status();
        if !status.can_swap() {
            return Err(MegadromeError::NotReady(status));
        }
        let (Some(orchestrator), Some(token_in), Some(token_out), Some(kind)) = (
            self.orchestrator.as_ref(),
            self.token_in.clone(),
            self.token_out.clone(),
            self.kind(),
        ) else {
            return Err(MegadromeError::NotReady(status));
        };

        let plan = SwapPlan {
            amount_in: if kind.is_wrap() {
                self.amount_in_base()
            } else {
                self.debounced_amount_base()
            },
            quoted_out: self.quote.amount_out,
            routes: self.quote.routes.clone(),
            needs_approval: self.needs_approval(),
            token_in,
            token_out,
            kind,
        };
        let deps = ExecutionDeps {
            approvals: &self.approvals,
            balances: &self.balances,
            settings: &self.settings,
            contracts: self.contracts,
        };
        let receipt = orchestrator.execute(&plan, deps).await?;

        // Balances were refetched by the orchestrator; the exact approval has been spent.
        self.balance_in = self.balances.balance(&plan.token_in, self.account).await;
        self.balance_out = self.balances.balance(&plan.token_out, self.account).await;
        if let (Some(token), Some(owner)) = (plan.token_in.address, self.account) {
            if ApprovalGate::applies(&plan.token_in, kind) {
                self.allowance = self.approvals.refetch(token, owner).await.ok();
            }
        }
        Ok(receipt)
    }
}
