/*
 * Transaction orchestration: approve -> swap with tracked lifecycles
 */

use chrono::Utc;
use ethers::types::{H256, U256};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};
use crate::config::ContractAddresses;
use crate::dex::{ContractCall, Route, TransactionSender, TxReceipt};
use crate::metrics::SwapMetrics;
use crate::models::{MegadromeError, Result, SwapStatus, TxErrorKind};
use crate::settings::{SettingsStore, SwapSettings};
use crate::swap::approval::ApprovalGate;
use crate::swap::balance::BalanceResolver;
use crate::swap::intent::{ExecutionKind, WrapDirection};
use crate::tokens::TokenDescriptor;
use crate::utils::minimum_received;

const CONFIRMATIONS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Success,
    Failed(TxErrorKind),
}

/// Phase of one transaction (the approval or the swap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Idle,
    /// Handed to the wallet, no hash yet.
    Pending,
    Confirming(H256),
    Settled { hash: Option<H256>, outcome: TxOutcome },
}

impl LifecyclePhase {
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, LifecyclePhase::Pending | LifecyclePhase::Confirming(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    AwaitingApproval,
    Submitting,
    Confirming(H256),
    Settled(TxOutcome),
}

impl OrchestratorState {
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            OrchestratorState::AwaitingApproval
                | OrchestratorState::Submitting
                | OrchestratorState::Confirming(_)
        )
    }
}

/// A surfaced, dismissible transaction error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxFailure {
    pub kind: TxErrorKind,
    pub message: String,
}

impl TxFailure {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

/// Everything needed to put one swap on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub token_in: TokenDescriptor,
    pub token_out: TokenDescriptor,
    pub kind: ExecutionKind,
    pub amount_in: U256,
    pub quoted_out: U256,
    pub routes: Vec<Route>,
    pub needs_approval: bool,
}

pub struct ExecutionDeps<'a> {
    pub approvals: &'a ApprovalGate,
    pub balances: &'a BalanceResolver,
    pub settings: &'a SettingsStore,
    pub contracts: ContractAddresses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Approval,
    Swap,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::Approval => "approve",
            Action::Swap => "swap",
        }
    }
}

#[derive(Debug)]
struct TxState {
    state: OrchestratorState,
    approval: LifecyclePhase,
    swap: LifecyclePhase,
    last_tx_hash: Option<H256>,
    error: Option<TxFailure>,
    transitions: Vec<OrchestratorState>,
}

impl TxState {
    fn enter(&mut self, state: OrchestratorState) {
        self.state = state;
        self.transitions.push(state);
    }

    fn lifecycle(&mut self, action: Action) -> &mut LifecyclePhase {
        match action {
            Action::Approval => &mut self.approval,
            Action::Swap => &mut self.swap,
        }
    }
}

fn lock_state(inner: &Mutex<TxState>) -> MutexGuard<'_, TxState> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Returns the machine to `Idle` if an execution future is dropped mid-flight.
struct FlightGuard {
    inner: Arc<Mutex<TxState>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut state = lock_state(&self.inner);
        if state.state.is_in_flight() {
            warn!("Execution abandoned in {:?}; resetting", state.state);
            for action in [Action::Approval, Action::Swap] {
                let phase = state.lifecycle(action);
                if phase.is_active() {
                    *phase = LifecyclePhase::Idle;
                }
            }
            state.enter(OrchestratorState::Idle);
        }
    }
}

pub struct TransactionOrchestrator {
    sender: Arc<dyn TransactionSender>,
    metrics: Arc<SwapMetrics>,
    inner: Arc<Mutex<TxState>>,
}

impl TransactionOrchestrator {
    pub fn new(sender: Arc<dyn TransactionSender>, metrics: Arc<SwapMetrics>) -> Self {
        Self {
            sender,
            metrics,
            inner: Arc::new(Mutex::new(TxState {
                state: OrchestratorState::Idle,
                approval: LifecyclePhase::Idle,
                swap: LifecyclePhase::Idle,
                last_tx_hash: None,
                error: None,
                transitions: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TxState> {
        lock_state(&self.inner)
    }

    #[must_use]
    pub fn account(&self) -> ethers::types::Address {
        self.sender.account()
    }

    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.lock().state
    }

    #[must_use]
    pub fn approval_phase(&self) -> LifecyclePhase {
        self.lock().approval
    }

    #[must_use]
    pub fn swap_phase(&self) -> LifecyclePhase {
        self.lock().swap
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.state().is_in_flight()
    }

    #[must_use]
    pub fn is_approving(&self) -> bool {
        self.approval_phase().is_active()
    }

    #[must_use]
    pub fn is_swapping(&self) -> bool {
        self.swap_phase().is_active()
    }

    #[must_use]
    pub fn last_tx_hash(&self) -> Option<H256> {
        self.lock().last_tx_hash
    }

    #[must_use]
    pub fn error(&self) -> Option<TxFailure> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    /// Every state entered so far, oldest first.
    #[must_use]
    pub fn transitions(&self) -> Vec<OrchestratorState> {
        self.lock().transitions.clone()
    }

    /// Maps a plan onto exactly one contract call.
    pub fn build_swap_call(
        plan: &SwapPlan,
        settings: &SwapSettings,
        contracts: &ContractAddresses,
        recipient: ethers::types::Address,
        now_unix: u64,
    ) -> Result<ContractCall> {
        if let ExecutionKind::Wrap(direction) = plan.kind {
            return Ok(match direction {
                WrapDirection::Wrap => ContractCall::Deposit {
                    wrapped: contracts.wrapped_native,
                    value: plan.amount_in,
                },
                WrapDirection::Unwrap => ContractCall::Withdraw {
                    wrapped: contracts.wrapped_native,
                    amount: plan.amount_in,
                },
            });
        }

        if plan.routes.is_empty() || plan.quoted_out.is_zero() {
            return Err(MegadromeError::NotReady(SwapStatus::NoQuote));
        }

        let router = contracts.router;
        let amount_out_min = minimum_received(plan.quoted_out, settings.slippage_percent);
        let deadline = U256::from(settings.deadline_from(now_unix));
        let routes = plan.routes.clone();

        Ok(match plan.kind {
            ExecutionKind::NativeIn => ContractCall::SwapExactEthForTokens {
                router,
                value: plan.amount_in,
                amount_out_min,
                routes,
                recipient,
                deadline,
            },
            ExecutionKind::NativeOut => ContractCall::SwapExactTokensForEth {
                router,
                amount_in: plan.amount_in,
                amount_out_min,
                routes,
                recipient,
                deadline,
            },
            ExecutionKind::TokenToToken | ExecutionKind::Wrap(_) => ContractCall::SwapExactTokensForTokens {
                router,
                amount_in: plan.amount_in,
                amount_out_min,
                routes,
                recipient,
                deadline,
            },
        })
    }

    fn start(&self, state: OrchestratorState) -> Result<FlightGuard> {
        let mut inner = self.lock();
        if inner.state.is_in_flight() {
            return Err(MegadromeError::NotReady(SwapStatus::InFlight));
        }
        inner.error = None;
        // The log covers the current execution only.
        inner.transitions.clear();
        inner.enter(state);
        Ok(FlightGuard {
            inner: self.inner.clone(),
        })
    }

    fn fail(&self, action: Action, hash: Option<H256>, err: MegadromeError) -> MegadromeError {
        let kind = err
            .tx_kind()
            .unwrap_or_else(|| TxErrorKind::classify(&err.to_string()));
        let message = match err {
            MegadromeError::Transaction { message, .. } => message,
            other => other.to_string(),
        };
        error!("{} failed ({:?}): {}", action.label(), kind, message);
        self.metrics.record_transaction(action.label(), "failed");

        let mut inner = self.lock();
        *inner.lifecycle(action) = LifecyclePhase::Settled {
            hash,
            outcome: TxOutcome::Failed(kind),
        };
        inner.error = Some(TxFailure {
            kind,
            message: message.clone(),
        });
        inner.enter(OrchestratorState::Idle);
        MegadromeError::Transaction { kind, message }
    }

    /// Submits `call` and waits for its confirmation. Failures settle the
    /// lifecycle and return the machine to `Idle`.
    async fn run(&self, action: Action, call: &ContractCall) -> Result<TxReceipt> {
        *self.lock().lifecycle(action) = LifecyclePhase::Pending;
        info!("Submitting {} ({})", action.label(), call.function_name());

        let hash = match self.sender.submit(call).await {
            Ok(hash) => hash,
            Err(e) => return Err(self.fail(action, None, e)),
        };
        {
            let mut inner = self.lock();
            *inner.lifecycle(action) = LifecyclePhase::Confirming(hash);
            if action == Action::Swap {
                inner.last_tx_hash = Some(hash);
                inner.enter(OrchestratorState::Confirming(hash));
            }
        }
        self.metrics.record_transaction(action.label(), "submitted");

        let receipt = match self.sender.wait_for_receipt(hash, CONFIRMATIONS).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.fail(action, Some(hash), e)),
        };
        if !receipt.success {
            let reason = receipt
                .revert_reason
                .clone()
                .unwrap_or_else(|| "execution reverted".to_string());
            return Err(self.fail(action, Some(hash), MegadromeError::transaction(reason)));
        }

        *self.lock().lifecycle(action) = LifecyclePhase::Settled {
            hash: Some(hash),
            outcome: TxOutcome::Success,
        };
        self.metrics.record_transaction(action.label(), "success");
        info!("{} confirmed: {:?}", action.label(), hash);
        Ok(receipt)
    }

    /// Stand-alone approval of exactly `amount` followed by an allowance refetch.
    pub async fn approve(&self, approvals: &ApprovalGate, token: &TokenDescriptor, amount: U256) -> Result<TxReceipt> {
        let Some(address) = token.address.filter(|_| !token.is_native()) else {
            return Err(MegadromeError::TokenError(format!("{} needs no approval", token.symbol)));
        };
        let _guard = self.start(OrchestratorState::AwaitingApproval)?;
        let receipt = self.run(Action::Approval, &approvals.approval_call(address, amount)).await?;

        if let Err(e) = approvals.refetch(address, self.account()).await {
            warn!("Allowance refetch after approval failed: {}", e);
        }
        self.lock().enter(OrchestratorState::Idle);
        Ok(receipt)
    }

    /// Approve (when required) then swap. The swap is only submitted after the
    /// approval's confirmation has been observed. Settings are read here, at
    /// execution time.
    pub async fn execute(&self, plan: &SwapPlan, deps: ExecutionDeps<'_>) -> Result<TxReceipt> {
        let account = self.account();
        let approval_first = plan.needs_approval && !plan.kind.is_wrap();
        let _guard = self.start(if approval_first {
            OrchestratorState::AwaitingApproval
        } else {
            OrchestratorState::Submitting
        })?;

        if approval_first {
            let token = plan
                .token_in
                .address
                .ok_or_else(|| MegadromeError::TokenError("Approval needs a token address".to_string()))?;
            self.run(Action::Approval, &deps.approvals.approval_call(token, plan.amount_in))
                .await?;

            let allowance = deps.approvals.refetch(token, account).await.unwrap_or_default();
            if allowance < plan.amount_in {
                return Err(self.fail(
                    Action::Approval,
                    None,
                    MegadromeError::transaction("allowance below amount after approval"),
                ));
            }
            self.lock().enter(OrchestratorState::Submitting);
        }

        let settings = deps.settings.current();
        let now_unix = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let call = match Self::build_swap_call(plan, &settings, &deps.contracts, account, now_unix) {
            Ok(call) => call,
            Err(e) => {
                self.lock().enter(OrchestratorState::Idle);
                return Err(e);
            }
        };

        let receipt = self.run(Action::Swap, &call).await?;
        self.lock().enter(OrchestratorState::Settled(TxOutcome::Success));

        refresh_affected_balances(plan, deps.balances, account).await;
        Ok(receipt)
    }
}

/// Refetches the native balance if either side is native and each ERC-20 side.
async fn refresh_affected_balances(plan: &SwapPlan, balances: &BalanceResolver, account: ethers::types::Address) {
    let native = [&plan.token_in, &plan.token_out]
        .into_iter()
        .find(|t| t.is_native());
    if let Some(native) = native {
        balances.refetch(native, Some(account)).await;
    }
    for token in [&plan.token_in, &plan.token_out] {
        if !token.is_native() {
            balances.refetch(token, Some(account)).await;
        }
    }
}
