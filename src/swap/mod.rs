/*
 * Swap engine: balances, quotes, approvals and transaction orchestration
 */

pub mod approval;
pub mod balance;
pub mod intent;
pub mod orchestrator;
pub mod quoter;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use approval::{needs_approval, ApprovalGate};
pub use balance::BalanceResolver;
pub use intent::{AmountInput, ExecutionKind, SwapIntent, WrapDirection};
pub use orchestrator::{
    ExecutionDeps, LifecyclePhase, OrchestratorState, SwapPlan, TransactionOrchestrator, TxFailure, TxOutcome,
};
pub use quoter::{select_route, DualRouteQuoter, Quote, QuoteKey, QuoteOutcome, RouteSelection};
pub use session::{SwapSession, SwapView};
