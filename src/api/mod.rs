/*
 * REST API module for the swap quote service
 */

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, routes, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use crate::config::Config;
use crate::models::{MegadromeError, QuoteResponse};
use crate::service::SwapService;
use crate::settings::{slippage_options, SwapSettings};
use crate::tokens::TokenDescriptor;

pub struct ApiState {
    pub config: Config,
    pub swap_service: Arc<SwapService>,
}

fn status_for(err: &MegadromeError) -> Status {
    match err {
        MegadromeError::TokenError(_) | MegadromeError::NotReady(_) => Status::BadRequest,
        MegadromeError::ContractError(_) => Status::UnprocessableEntity,
        _ => Status::InternalServerError,
    }
}

#[get("/api/v1/quote?<token_in>&<token_out>&<amount_in>")]
pub async fn get_quote(
    token_in: &str,
    token_out: &str,
    amount_in: &str,
    state: &State<ApiState>,
) -> std::result::Result<Json<QuoteResponse>, Custom<String>> {
    let quote = state
        .swap_service
        .quote(token_in, token_out, amount_in)
        .await
        .map_err(|e| {
            error!("Quote {} -> {} failed: {:?}", token_in, token_out, e);
            Custom(status_for(&e), format!("Error fetching quote: {e}"))
        })?;

    Ok(Json(quote))
}

#[get("/api/v1/tokens")]
pub fn get_tokens(state: &State<ApiState>) -> Json<Vec<TokenDescriptor>> {
    Json(state.swap_service.tokens().to_vec())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub current: SwapSettings,
    pub slippage_options: Vec<Decimal>,
}

#[get("/api/v1/settings")]
pub fn get_settings(state: &State<ApiState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        current: state.swap_service.settings().current(),
        slippage_options: slippage_options().to_vec(),
    })
}

#[get("/metrics")]
pub fn get_metrics(state: &State<ApiState>) -> std::result::Result<String, Custom<String>> {
    state
        .swap_service
        .metrics()
        .render()
        .map_err(|e| Custom(Status::InternalServerError, e.to_string()))
}

#[must_use]
pub fn create_rocket(state: ApiState) -> rocket::Rocket<rocket::Build> {
    let figment = rocket::Config::figment()
        .merge(("address", state.config.server.host.clone()))
        .merge(("port", state.config.server.port));

    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![get_quote, get_tokens, get_settings, get_metrics, health_check])
}

#[get("/health")]
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::test_service;
    use crate::swap::mock::MockChain;
    use ethers::types::U256;
    use rocket::local::asynchronous::Client;

    async fn client(chain: Arc<MockChain>) -> Client {
        let service = test_service(chain);
        let state = ApiState {
            config: crate::service::tests::test_config(&crate::tokens::TokenRegistry::monad()),
            swap_service: Arc::new(service),
        };
        Client::tracked(create_rocket(state)).await.unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let client = client(Arc::new(MockChain::default())).await;
        let response = client.get("/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn lists_registry_tokens() {
        let client = client(Arc::new(MockChain::default())).await;
        let response = client.get("/api/v1/tokens").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let tokens: Vec<TokenDescriptor> = response.into_json().await.unwrap();
        assert!(tokens.iter().any(|t| t.symbol == "MON" && t.is_native()));
    }

    #[tokio::test]
    async fn exposes_settings_and_quick_options() {
        let client = client(Arc::new(MockChain::default())).await;
        let response = client.get("/api/v1/settings").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: SettingsResponse = response.into_json().await.unwrap();
        assert_eq!(body.current, SwapSettings::default());
        assert_eq!(body.slippage_options.len(), 3);
    }

    #[tokio::test]
    async fn quote_endpoint_and_metrics() {
        let chain = Arc::new(MockChain::default());
        chain.set_quote(false, None, Ok(U256::from(990_000u64)));
        let client = client(chain).await;

        let response = client
            .get("/api/v1/quote?token_in=USDC&token_out=USDT&amount_in=1")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let quote: QuoteResponse = response.into_json().await.unwrap();
        assert_eq!(quote.amount_out, "0.99");

        let metrics = client.get("/metrics").dispatch().await.into_string().await.unwrap();
        assert!(metrics.contains("megadrome_quote_requests_total"));
    }

    #[tokio::test]
    async fn bad_quote_requests_are_client_errors() {
        let client = client(Arc::new(MockChain::default())).await;
        let same = client
            .get("/api/v1/quote?token_in=USDC&token_out=USDC&amount_in=1")
            .dispatch()
            .await;
        assert_eq!(same.status(), Status::BadRequest);

        let no_liquidity = client
            .get("/api/v1/quote?token_in=USDC&token_out=USDT&amount_in=1")
            .dispatch()
            .await;
        assert_eq!(no_liquidity.status(), Status::UnprocessableEntity);
    }
}
