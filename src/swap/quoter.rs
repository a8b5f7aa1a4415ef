/*
 * Dual-route quoting (stable vs volatile) and the unit reference price
 */

use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::config::ContractAddresses;
use crate::dex::{ChainReader, Route};
use crate::metrics::SwapMetrics;
use crate::tokens::TokenDescriptor;
use crate::utils::{parse_units, price_impact_percent, to_decimal};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Realized output in token-out base units; the last entry of `amounts`.
    pub amount_out: U256,
    pub amounts: Vec<U256>,
    pub routes: Vec<Route>,
    pub route_is_stable: bool,
    /// Token-out human units received for one token-in on the volatile curve.
    pub exchange_rate: Decimal,
    pub price_impact: Decimal,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Quote {
    /// A wrap or unwrap converts 1:1 with no fee and no route.
    #[must_use]
    pub fn wrap(amount: U256) -> Self {
        Self {
            amount_out: amount,
            amounts: vec![amount, amount],
            exchange_rate: Decimal::ONE,
            ..Self::default()
        }
    }
}

/// Outcome of the two route queries after the selection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSelection {
    pub amounts: Vec<U256>,
    pub routes: Vec<Route>,
    pub route_is_stable: bool,
    pub error: Option<String>,
}

impl RouteSelection {
    #[must_use]
    pub fn amount_out(&self) -> U256 {
        self.amounts.last().copied().unwrap_or_default()
    }
}

fn last_amount(result: &Result<Vec<U256>, String>) -> U256 {
    result
        .as_ref()
        .ok()
        .and_then(|amounts| amounts.last().copied())
        .unwrap_or_default()
}

/// Picks the stable route only when it yields strictly more; a failed route
/// counts as zero output. The error survives only if both routes failed or
/// the chosen one did.
#[must_use]
pub fn select_route(
    volatile: (Route, Result<Vec<U256>, String>),
    stable: (Route, Result<Vec<U256>, String>),
) -> RouteSelection {
    let (volatile_route, volatile_result) = volatile;
    let (stable_route, stable_result) = stable;
    let use_stable = last_amount(&stable_result) > last_amount(&volatile_result);

    let (route, chosen, other) = if use_stable {
        (stable_route, stable_result, volatile_result)
    } else {
        (volatile_route, volatile_result, stable_result)
    };

    match chosen {
        Ok(amounts) => RouteSelection {
            amounts,
            routes: vec![route],
            route_is_stable: use_stable,
            error: None,
        },
        Err(chosen_error) => RouteSelection {
            amounts: Vec::new(),
            routes: vec![route],
            route_is_stable: use_stable,
            error: Some(match other {
                Err(other_error) => format!("{chosen_error}; {other_error}"),
                Ok(_) => chosen_error,
            }),
        },
    }
}

/// Identity of a quote request. Responses tagged with an older key are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteKey {
    pub from: Address,
    pub to: Address,
    pub amount_in: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteTicket {
    generation: u64,
    key: QuoteKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    Fresh(Quote),
    /// Inputs changed while the request was in flight.
    Stale,
}

/// How long a unit reference quote is reused for its pair.
pub const REFERENCE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
struct CachedReference {
    fetched_at: Instant,
    probe_in: U256,
    probe_out: U256,
}

#[derive(Debug, Default)]
struct QuoteState {
    generation: u64,
    current: Option<QuoteKey>,
    latest: Quote,
    loading: bool,
    references: HashMap<(Address, Address), CachedReference>,
}

pub struct DualRouteQuoter {
    reader: Arc<dyn ChainReader>,
    contracts: ContractAddresses,
    metrics: Arc<SwapMetrics>,
    state: Mutex<QuoteState>,
}

impl DualRouteQuoter {
    pub fn new(reader: Arc<dyn ChainReader>, contracts: ContractAddresses, metrics: Arc<SwapMetrics>) -> Self {
        Self {
            reader,
            contracts,
            metrics,
            state: Mutex::new(QuoteState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuoteState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a request for `key`. The generation only moves when the
    /// inputs change, so repeated identical requests stay valid.
    pub fn begin(&self, key: QuoteKey) -> QuoteTicket {
        let mut state = self.lock();
        if state.current != Some(key) {
            state.generation += 1;
            state.current = Some(key);
        }
        state.loading = true;
        QuoteTicket {
            generation: state.generation,
            key,
        }
    }

    /// Stores `quote` if `ticket` still matches the current inputs.
    pub fn commit(&self, ticket: QuoteTicket, quote: Quote) -> QuoteOutcome {
        let mut state = self.lock();
        if ticket.generation != state.generation || state.current != Some(ticket.key) {
            debug!("Dropping stale quote for {:?}", ticket.key);
            return QuoteOutcome::Stale;
        }
        state.latest = quote.clone();
        state.loading = false;
        QuoteOutcome::Fresh(quote)
    }

    /// Forgets the current inputs; anything in flight becomes stale.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.current = None;
        state.latest = Quote::default();
        state.loading = false;
    }

    /// Latest accepted quote with the current loading flag.
    #[must_use]
    pub fn latest(&self) -> Quote {
        let state = self.lock();
        Quote {
            is_loading: state.loading,
            ..state.latest.clone()
        }
    }

    fn routes_for(&self, token_in: &TokenDescriptor, token_out: &TokenDescriptor) -> (Address, Address) {
        (
            token_in.routing_address(self.contracts.wrapped_native),
            token_out.routing_address(self.contracts.wrapped_native),
        )
    }

    async fn amounts_out(&self, amount_in: U256, route: Route, label: &str) -> Result<Vec<U256>, String> {
        match self
            .reader
            .get_amounts_out(self.contracts.router, amount_in, &[route])
            .await
        {
            Ok(amounts) => {
                self.metrics.record_quote(label, "ok");
                Ok(amounts)
            }
            Err(e) => {
                self.metrics.record_quote(label, "error");
                debug!("{} route quote failed: {}", label, e);
                Err(e.to_string())
            }
        }
    }

    /// Queries both curves concurrently and applies the selection rule.
    pub async fn quote_routes(&self, from: Address, to: Address, amount_in: U256) -> RouteSelection {
        let factory = self.contracts.pair_factory;
        let volatile = Route::volatile(from, to, factory);
        let stable = Route::stable(from, to, factory);

        let (volatile_result, stable_result) = tokio::join!(
            self.amounts_out(amount_in, volatile, "volatile"),
            self.amounts_out(amount_in, stable, "stable"),
        );
        select_route((volatile, volatile_result), (stable, stable_result))
    }

    /// Output for exactly one token-in on the volatile curve, even when the
    /// trade itself settles on the stable curve. The result depends only on
    /// the pair and is reused for `REFERENCE_TTL`; failures are not cached.
    pub async fn reference_probe(&self, from: Address, to: Address, decimals_in: u8) -> Option<(U256, U256)> {
        let cached = self.lock().references.get(&(from, to)).copied();
        if let Some(cached) = cached.filter(|c| c.fetched_at.elapsed() < REFERENCE_TTL) {
            return Some((cached.probe_in, cached.probe_out));
        }

        let probe_in = parse_units("1", decimals_in);
        let route = Route::volatile(from, to, self.contracts.pair_factory);
        let amounts = self.amounts_out(probe_in, route, "reference").await.ok()?;
        let probe_out = *amounts.last()?;
        self.lock().references.insert(
            (from, to),
            CachedReference {
                fetched_at: Instant::now(),
                probe_in,
                probe_out,
            },
        );
        Some((probe_in, probe_out))
    }

    /// Full quote for a router trade. Degenerate inputs return an empty quote
    /// without touching the network.
    pub async fn quote(
        &self,
        token_in: &TokenDescriptor,
        token_out: &TokenDescriptor,
        amount_in: U256,
    ) -> QuoteOutcome {
        let (from, to) = self.routes_for(token_in, token_out);
        let unresolved = (!token_in.is_native() && token_in.address.is_none())
            || (!token_out.is_native() && token_out.address.is_none());

        if amount_in.is_zero() || from == to || unresolved {
            self.invalidate();
            return QuoteOutcome::Fresh(Quote::default());
        }

        let ticket = self.begin(QuoteKey { from, to, amount_in });
        let (selection, probe) = tokio::join!(
            self.quote_routes(from, to, amount_in),
            self.reference_probe(from, to, token_in.decimals),
        );

        let amount_out = selection.amount_out();
        let (exchange_rate, price_impact) = match probe {
            Some((probe_in, probe_out)) => (
                to_decimal(probe_out, token_out.decimals).unwrap_or_else(|e| {
                    warn!("Exchange rate unavailable: {}", e);
                    Decimal::ZERO
                }),
                price_impact_percent(amount_in, amount_out, probe_in, probe_out),
            ),
            None => (Decimal::ZERO, Decimal::ZERO),
        };

        let quote = Quote {
            amount_out,
            amounts: selection.amounts,
            routes: selection.routes,
            route_is_stable: selection.route_is_stable,
            exchange_rate,
            price_impact,
            is_loading: false,
            error: selection.error,
        };

        let outcome = self.commit(ticket, quote);
        if outcome == QuoteOutcome::Stale {
            self.metrics.record_quote("combined", "stale");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::mock::MockChain;
    use crate::tokens::TokenRegistry;
    use std::str::FromStr;
    use std::time::Duration;

    fn contracts(registry: &TokenRegistry) -> ContractAddresses {
        ContractAddresses {
            router: Address::repeat_byte(0x01),
            pair_factory: Address::repeat_byte(0x02),
            wrapped_native: registry.by_symbol("WMON").unwrap().address.unwrap(),
        }
    }

    fn quoter(chain: Arc<MockChain>, registry: &TokenRegistry) -> DualRouteQuoter {
        DualRouteQuoter::new(chain, contracts(registry), Arc::new(SwapMetrics::new().unwrap()))
    }

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn pair(stable_out: Result<u64, &str>, volatile_out: Result<u64, &str>) -> RouteSelection {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let f = Address::repeat_byte(3);
        let wrap = |r: Result<u64, &str>| r.map(|v| vec![U256::from(100u64), U256::from(v)]).map_err(str::to_string);
        select_route(
            (Route::volatile(a, b, f), wrap(volatile_out)),
            (Route::stable(a, b, f), wrap(stable_out)),
        )
    }

    #[test]
    fn selects_the_larger_output() {
        for (s, v) in [(5u64, 7u64), (7, 5), (6, 6), (0, 0), (1, 0)] {
            let selection = pair(Ok(s), Ok(v));
            assert_eq!(selection.route_is_stable, s > v, "s={s} v={v}");
            assert_eq!(selection.amount_out(), U256::from(s.max(v)));
            assert_eq!(selection.routes[0].stable, s > v);
            assert!(selection.error.is_none());
        }
    }

    #[test]
    fn failed_route_counts_as_zero() {
        let selection = pair(Err("no pool"), Ok(5));
        assert!(!selection.route_is_stable);
        assert_eq!(selection.amount_out(), U256::from(5u64));
        assert!(selection.error.is_none());

        let selection = pair(Ok(5), Err("no pool"));
        assert!(selection.route_is_stable);
        assert!(selection.error.is_none());
    }

    #[test]
    fn error_surfaces_when_both_fail_or_winner_failed() {
        let both = pair(Err("stable down"), Err("volatile down"));
        assert!(both.amount_out().is_zero());
        let msg = both.error.unwrap();
        assert!(msg.contains("stable down") && msg.contains("volatile down"));

        // Tie at zero favors volatile, which errored.
        let winner_failed = pair(Ok(0), Err("volatile down"));
        assert!(!winner_failed.route_is_stable);
        assert_eq!(winner_failed.error.as_deref(), Some("volatile down"));
    }

    #[tokio::test]
    async fn native_to_usdc_prefers_volatile() {
        let registry = TokenRegistry::monad();
        let mon = registry.by_symbol("MON").unwrap();
        let usdc = registry.by_symbol("USDC").unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_quote(true, Some(e18(10)), Ok(U256::from(5_500_000u64)));
        chain.set_quote(false, Some(e18(10)), Ok(U256::from(5_600_000u64)));
        chain.set_quote(false, Some(e18(1)), Ok(U256::from(570_000u64)));

        let quoter = quoter(chain.clone(), &registry);
        let QuoteOutcome::Fresh(quote) = quoter.quote(mon, usdc, e18(10)).await else {
            panic!("expected fresh quote");
        };

        assert!(!quote.route_is_stable);
        assert_eq!(quote.amount_out, U256::from(5_600_000u64));
        assert_eq!(crate::utils::format_units(quote.amount_out, usdc.decimals), "5.6");
        assert_eq!(quote.exchange_rate, Decimal::from_str("0.57").unwrap());
        assert!(quote.price_impact > Decimal::ZERO);
        // Native side routes through WMON.
        let wmon = registry.by_symbol("WMON").unwrap().address;
        assert!(chain.quote_calls().iter().all(|(_, r)| Some(r.from) == wmon));
        assert_eq!(chain.quote_calls().len(), 3);
    }

    #[tokio::test]
    async fn reference_probe_always_uses_volatile_curve() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let usdt = registry.by_symbol("USDT").unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_quote(true, None, Ok(U256::from(999_000u64)));
        chain.set_quote(false, None, Ok(U256::from(990_000u64)));

        let quoter = quoter(chain.clone(), &registry);
        let QuoteOutcome::Fresh(quote) = quoter.quote(usdc, usdt, U256::from(1_000_000u64)).await else {
            panic!("expected fresh quote");
        };

        assert!(quote.route_is_stable);
        let probes: Vec<_> = chain
            .quote_calls()
            .into_iter()
            .filter(|(amount, _)| *amount == U256::from(1_000_000u64))
            .collect();
        // Trade size equals the unit probe here: volatile, stable, and the volatile probe.
        assert_eq!(probes.iter().filter(|(_, r)| r.stable).count(), 1);
        assert_eq!(probes.iter().filter(|(_, r)| !r.stable).count(), 2);
        assert_eq!(quote.exchange_rate, Decimal::from_str("0.99").unwrap());
    }

    #[tokio::test]
    async fn unit_rate_is_shared_across_trade_sizes() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let usdt = registry.by_symbol("USDT").unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_quote(false, None, Ok(U256::from(990_000u64)));
        chain.set_quote(true, None, Err("no stable pool"));

        let quoter = quoter(chain.clone(), &registry);
        for amount in [2_000_000u64, 5_000_000, 9_000_000] {
            let QuoteOutcome::Fresh(quote) = quoter.quote(usdc, usdt, U256::from(amount)).await else {
                panic!("expected fresh quote");
            };
            assert_eq!(quote.exchange_rate, Decimal::from_str("0.99").unwrap());
        }

        let unit = U256::from(1_000_000u64);
        assert_eq!(chain.quote_calls().iter().filter(|(amount, _)| *amount == unit).count(), 1);
        assert_eq!(chain.quote_calls().len(), 7);
    }

    #[tokio::test]
    async fn failed_reference_read_is_retried() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let usdt = registry.by_symbol("USDT").unwrap();
        let (from, to) = (usdc.address.unwrap(), usdt.address.unwrap());
        let chain = Arc::new(MockChain::default());
        let quoter = quoter(chain.clone(), &registry);

        assert_eq!(quoter.reference_probe(from, to, usdc.decimals).await, None);
        chain.set_quote(false, None, Ok(U256::from(990_000u64)));
        let expected = Some((U256::from(1_000_000u64), U256::from(990_000u64)));
        assert_eq!(quoter.reference_probe(from, to, usdc.decimals).await, expected);
        assert_eq!(quoter.reference_probe(from, to, usdc.decimals).await, expected);
        assert_eq!(chain.quote_calls().len(), 2);
    }

    #[tokio::test]
    async fn degenerate_inputs_issue_no_requests() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let mon = registry.by_symbol("MON").unwrap();
        let wmon = registry.by_symbol("WMON").unwrap();
        let chain = Arc::new(MockChain::default());
        let quoter = quoter(chain.clone(), &registry);

        assert_eq!(quoter.quote(usdc, mon, U256::zero()).await, QuoteOutcome::Fresh(Quote::default()));
        assert_eq!(quoter.quote(usdc, usdc, U256::one()).await, QuoteOutcome::Fresh(Quote::default()));
        assert_eq!(quoter.quote(mon, wmon, U256::one()).await, QuoteOutcome::Fresh(Quote::default()));
        assert!(chain.quote_calls().is_empty());
    }

    #[tokio::test]
    async fn quote_failure_degrades_to_no_quote() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let wbtc = registry.by_symbol("WBTC").unwrap();
        let chain = Arc::new(MockChain::default());

        let quoter = quoter(chain, &registry);
        let QuoteOutcome::Fresh(quote) = quoter.quote(usdc, wbtc, U256::from(5u64)).await else {
            panic!("expected fresh quote");
        };
        assert!(quote.amount_out.is_zero());
        assert!(quote.error.is_some());
        assert!(quote.price_impact.is_zero());
        assert!(quote.exchange_rate.is_zero());
    }

    #[test]
    fn stale_ticket_is_rejected() {
        let registry = TokenRegistry::monad();
        let quoter = quoter(Arc::new(MockChain::default()), &registry);
        let key = |n: u64| QuoteKey {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            amount_in: U256::from(n),
        };

        let first = quoter.begin(key(1));
        let second = quoter.begin(key(2));
        let again = quoter.begin(key(2));
        assert!(quoter.latest().is_loading);

        assert_eq!(quoter.commit(first, Quote::wrap(U256::from(1u64))), QuoteOutcome::Stale);
        assert!(matches!(quoter.commit(second, Quote::wrap(U256::from(2u64))), QuoteOutcome::Fresh(_)));
        assert!(matches!(quoter.commit(again, Quote::wrap(U256::from(2u64))), QuoteOutcome::Fresh(_)));
        assert_eq!(quoter.latest().amount_out, U256::from(2u64));
        assert!(!quoter.latest().is_loading);

        quoter.invalidate();
        let third = quoter.begin(key(3));
        quoter.invalidate();
        assert_eq!(quoter.commit(third, Quote::default()), QuoteOutcome::Stale);
    }

    #[tokio::test]
    async fn slow_old_request_never_overwrites_newer() {
        let registry = TokenRegistry::monad();
        let usdc = registry.by_symbol("USDC").unwrap();
        let usdt = registry.by_symbol("USDT").unwrap();
        let chain = Arc::new(MockChain::default());
        chain.set_quote(false, None, Ok(U256::from(1u64)));
        chain.set_quote(false, Some(U256::from(5_000_000u64)), Ok(U256::from(4_900_000u64)));
        chain.set_quote(false, Some(U256::from(7_000_000u64)), Ok(U256::from(6_800_000u64)));
        chain.set_quote(true, None, Err("no stable pool"));
        chain.set_quote_delay(U256::from(5_000_000u64), Duration::from_millis(80));

        let quoter = Arc::new(quoter(chain, &registry));
        let slow = {
            let quoter = quoter.clone();
            let (usdc, usdt) = (usdc.clone(), usdt.clone());
            tokio::spawn(async move { quoter.quote(&usdc, &usdt, U256::from(5_000_000u64)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fast = quoter.quote(usdc, usdt, U256::from(7_000_000u64)).await;

        assert!(matches!(fast, QuoteOutcome::Fresh(ref q) if q.amount_out == U256::from(6_800_000u64)));
        assert_eq!(slow.await.unwrap(), QuoteOutcome::Stale);
        assert_eq!(quoter.latest().amount_out, U256::from(6_800_000u64));
    }

    #[test]
    fn wrap_quote_is_identity() {
        let amount = U256::from(2_500_000_000_000_000_000u128);
        let quote = Quote::wrap(amount);
        assert_eq!(quote.amount_out, amount);
        assert!(quote.price_impact.is_zero());
        assert!(quote.routes.is_empty());
    }
}
