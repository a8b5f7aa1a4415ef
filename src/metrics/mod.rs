/*
 * Prometheus metrics for quoting and transaction outcomes
 */

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use crate::models::{MegadromeError, Result};

pub struct SwapMetrics {
    registry: Registry,
    quote_requests: IntCounterVec,
    transactions: IntCounterVec,
}

impl SwapMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let quote_requests = IntCounterVec::new(
            Opts::new("megadrome_quote_requests_total", "Router quote requests by route and outcome"),
            &["route", "outcome"],
        )
        .map_err(metrics_error)?;
        let transactions = IntCounterVec::new(
            Opts::new("megadrome_transactions_total", "Submitted transactions by action and outcome"),
            &["action", "outcome"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(quote_requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(transactions.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            quote_requests,
            transactions,
        })
    }

    /// `route` is `stable`, `volatile` or `reference`; `outcome` is `ok`, `error` or `stale`.
    pub fn record_quote(&self, route: &str, outcome: &str) {
        self.quote_requests.with_label_values(&[route, outcome]).inc();
    }

    pub fn record_transaction(&self, action: &str, outcome: &str) {
        self.transactions.with_label_values(&[action, outcome]).inc();
    }

    #[must_use]
    pub fn quote_count(&self, route: &str, outcome: &str) -> u64 {
        self.quote_requests.with_label_values(&[route, outcome]).get()
    }

    #[must_use]
    pub fn transaction_count(&self, action: &str, outcome: &str) -> u64 {
        self.transactions.with_label_values(&[action, outcome]).get()
    }

    /// Text exposition format for scraping.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| MegadromeError::Unknown(format!("Metrics encoding: {e}")))
    }
}

fn metrics_error(e: prometheus::Error) -> MegadromeError {
    MegadromeError::Unknown(format!("Metrics error: {e}"))
}
