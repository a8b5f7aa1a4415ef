/*
 * Swap service that wires configuration, chain access and the quote engine
 */

use std::sync::Arc;
use tracing::{info, warn};
use crate::{
    config::Config,
    dex::{ChainReader, TransactionSender},
    metrics::SwapMetrics,
    models::{MegadromeError, QuoteResponse, Result, SwapStatus},
    rpc::{RpcClient, WalletClient},
    settings::SettingsStore,
    swap::{DualRouteQuoter, Quote, QuoteOutcome, SwapIntent, SwapSession},
    tokens::{TokenDescriptor, TokenRegistry},
    utils::{format_units, minimum_received},
};

pub struct SwapService {
    config: Config,
    reader: Arc<dyn ChainReader>,
    wallet: Option<Arc<dyn TransactionSender>>,
    registry: TokenRegistry,
    settings: Arc<SettingsStore>,
    metrics: Arc<SwapMetrics>,
}

impl SwapService {
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing Swap Service");

        let rpc = RpcClient::new(&config.chain.rpc_url, config.chain.chain_id).await?;
        info!("Connected to Monad RPC");

        let wallet: Option<Arc<dyn TransactionSender>> = match &config.swap.private_key {
            Some(key) => {
                let wallet = WalletClient::new(&rpc, key)?;
                info!("Wallet {:?} loaded", wallet.account());
                Some(Arc::new(wallet))
            }
            None => None,
        };

        let mut registry = TokenRegistry::monad();
        if let Some(url) = &config.swap.token_list_url {
            let client = reqwest::Client::new();
            if let Err(e) = registry.extend_from_url(&client, url).await {
                warn!("Token list {} unavailable: {}", url, e);
            }
        }
        info!("Token registry holds {} tokens", registry.tokens().len());

        let settings = match &config.swap.settings_path {
            Some(path) => SettingsStore::load(path),
            None => SettingsStore::default(),
        };

        Ok(Self::from_parts(
            config,
            Arc::new(rpc),
            wallet,
            registry,
            Arc::new(settings),
            Arc::new(SwapMetrics::new()?),
        ))
    }

    #[must_use]
    pub fn from_parts(
        config: Config,
        reader: Arc<dyn ChainReader>,
        wallet: Option<Arc<dyn TransactionSender>>,
        registry: TokenRegistry,
        settings: Arc<SettingsStore>,
        metrics: Arc<SwapMetrics>,
    ) -> Self {
        Self {
            config,
            reader,
            wallet,
            registry,
            settings,
            metrics,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &[TokenDescriptor] {
        self.registry.tokens()
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<SwapMetrics> {
        &self.metrics
    }

    /// A fresh interactive session bound to the configured wallet, if any.
    #[must_use]
    pub fn session(&self) -> SwapSession {
        SwapSession::new(
            self.reader.clone(),
            self.wallet.clone(),
            self.config.contracts,
            self.settings.clone(),
            self.metrics.clone(),
            self.config.swap.quote_debounce(),
        )
    }

    /// One-shot quote for `amount_in` human units of `token_in`. Requests are
    /// independent, so each gets its own quoter.
    pub async fn quote(&self, token_in: &str, token_out: &str, amount_in: &str) -> Result<QuoteResponse> {
        let intent = SwapIntent::new(
            self.registry.resolve(token_in)?.clone(),
            self.registry.resolve(token_out)?.clone(),
            amount_in,
        );
        let contracts = self.config.contracts;
        let kind = intent.kind(contracts.wrapped_native);

        if intent.is_same_token(contracts.wrapped_native) {
            return Err(MegadromeError::NotReady(SwapStatus::SelectDifferentTokens));
        }
        if intent.amount_in_base.is_zero() {
            return Err(MegadromeError::NotReady(SwapStatus::EnterAmount));
        }
        let (token_in, token_out, amount_base) = (&intent.token_in, &intent.token_out, intent.amount_in_base);

        info!("Quoting {} {} -> {}", amount_in, token_in.symbol, token_out.symbol);

        let quote = if kind.is_wrap() {
            Quote::wrap(amount_base)
        } else {
            let quoter = DualRouteQuoter::new(self.reader.clone(), contracts, self.metrics.clone());
            match quoter.quote(token_in, token_out, amount_base).await {
                QuoteOutcome::Fresh(quote) => quote,
                QuoteOutcome::Stale => {
                    return Err(MegadromeError::Unknown("Quote superseded".to_string()));
                }
            }
        };

        if quote.amount_out.is_zero() {
            return Err(match quote.error {
                Some(e) => MegadromeError::ContractError(e),
                None => MegadromeError::NotReady(SwapStatus::NoQuote),
            });
        }

        let settings = self.settings.current();
        let minimum = if kind.is_wrap() {
            quote.amount_out
        } else {
            minimum_received(quote.amount_out, settings.slippage_percent)
        };

        Ok(QuoteResponse {
            token_in: token_in.symbol.clone(),
            token_out: token_out.symbol.clone(),
            amount_in: format_units(amount_base, token_in.decimals),
            amount_out: format_units(quote.amount_out, token_out.decimals),
            minimum_received: format_units(minimum, token_out.decimals),
            exchange_rate: quote.exchange_rate,
            price_impact_percent: quote.price_impact,
            route_is_stable: quote.route_is_stable,
            is_wrap: kind.is_wrap(),
            slippage_percent: settings.slippage_percent,
        })
    }
}
