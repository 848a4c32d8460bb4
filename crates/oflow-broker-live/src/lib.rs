//! Live HTTP broker adapter.
//!
//! This crate is the only place in the workspace that speaks HTTP to a real
//! brokerage daemon. It implements [`oflow_gateway::MarketGateway`] exactly
//! as `oflow-broker-sim` does, so strategy/runtime code that holds a
//! `&dyn MarketGateway` cannot tell which one is behind it.
//!
//! `MarketGateway` is natively `async` (`#[async_trait]`), so this adapter
//! drives a plain async `reqwest::Client` — no blocking client, no
//! `tokio::task::block_in_place` bridge onto the runtime.

mod error;
mod wire;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use oflow_db::Side;
use oflow_gateway::{Account, BrokerPosition, GatewayError, MarketGateway, MinuteBar, OrderResult, Quote};
use oflow_schemas::{BrokerAccountDto, BrokerOrderDto, BrokerPositionDto, BrokerQuoteDto};

/// Connection settings for a brokerage daemon's REST API.
///
/// The daemon itself (auth, rate limiting, order book) is out of scope for
/// this crate — we only speak its wire protocol.
#[derive(Clone, Debug)]
pub struct LiveBrokerConfig {
    /// Base URL of the brokerage daemon, e.g. `"https://broker.internal:8443"`.
    /// No trailing slash.
    pub base_url: String,
    /// Sent as `Authorization: Bearer {api_key}` on every request.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl LiveBrokerConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Live broker adapter backed by an async `reqwest` client.
pub struct LiveBroker {
    config: LiveBrokerConfig,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    client_order_id: &'a str,
    symbol: &'a str,
    side: &'a str,
    qty: i64,
    limit_price: f64,
}

impl LiveBroker {
    pub fn new(config: LiveBrokerConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(error::from_reqwest)?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.config.api_key)
    }

    async fn decode_ok<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Network {
                detail: format!("status={status} body={body}"),
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| GatewayError::Network { detail: e.to_string() })
    }
}

#[async_trait]
impl MarketGateway for LiveBroker {
    async fn connect(&self) -> Result<(), GatewayError> {
        let resp = self
            .auth(self.http.get(self.url("/v1/health")))
            .send()
            .await
            .map_err(error::from_reqwest)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::Network {
                detail: format!("health check failed: status={}", resp.status()),
            })
        }
    }

    async fn disconnect(&self) {}

    async fn get_quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        let resp = self
            .auth(self.http.get(self.url(&format!("/v1/quotes/{symbol}"))))
            .send()
            .await
            .map_err(error::from_reqwest)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::SymbolUnknown {
                symbol: symbol.to_string(),
            });
        }
        let dto: BrokerQuoteDto = Self::decode_ok(resp).await?;
        if wire::quote_stale(&dto) {
            return Err(GatewayError::Stale {
                symbol: symbol.to_string(),
            });
        }
        Ok(Quote {
            symbol_price: dto.price,
            as_of_eastern: dto.as_of_utc,
        })
    }

    async fn get_minute_bars(
        &self,
        symbol: &str,
        from_eastern: DateTime<Utc>,
        to_eastern: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, GatewayError> {
        let resp = self
            .auth(
                self.http
                    .get(self.url(&format!("/v1/bars/{symbol}")))
                    .query(&[
                        ("from", from_eastern.to_rfc3339()),
                        ("to", to_eastern.to_rfc3339()),
                    ]),
            )
            .send()
            .await
            .map_err(error::from_reqwest)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::SymbolUnknown {
                symbol: symbol.to_string(),
            });
        }
        Self::decode_ok(resp).await
    }

    async fn get_account(&self) -> Result<Account, GatewayError> {
        let resp = self
            .auth(self.http.get(self.url("/v1/account")))
            .send()
            .await
            .map_err(error::from_reqwest)?;
        let dto: BrokerAccountDto = Self::decode_ok(resp).await?;
        Ok(wire::account_from_dto(dto))
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, GatewayError> {
        let resp = self
            .auth(self.http.get(self.url("/v1/positions")))
            .send()
            .await
            .map_err(error::from_reqwest)?;
        let dtos: Vec<BrokerPositionDto> = Self::decode_ok(resp).await?;
        Ok(dtos.into_iter().map(wire::position_from_dto).collect())
    }

    async fn place_order(
        &self,
        client_id: &str,
        symbol: &str,
        side: Side,
        shares: i64,
        limit_price: f64,
    ) -> Result<OrderResult, GatewayError> {
        let body = PlaceOrderBody {
            client_order_id: client_id,
            symbol,
            side: side.as_str(),
            qty: shares,
            limit_price,
        };
        let resp = self
            .auth(self.http.post(self.url("/v1/orders")))
            .json(&body)
            .send()
            .await
            .map_err(error::from_reqwest)?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(GatewayError::IdempotencyConflict {
                client_id: client_id.to_string(),
            });
        }
        let dto: BrokerOrderDto = Self::decode_ok(resp).await?;
        wire::order_result_from_dto(dto)
            .map_err(|e| GatewayError::Network { detail: e.to_string() })
    }

    async fn get_order(&self, client_id: &str) -> Result<OrderResult, GatewayError> {
        let resp = self
            .auth(self.http.get(self.url(&format!("/v1/orders/{client_id}"))))
            .send()
            .await
            .map_err(error::from_reqwest)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                client_id: client_id.to_string(),
            });
        }
        let dto: BrokerOrderDto = Self::decode_ok(resp).await?;
        wire::order_result_from_dto(dto)
            .map_err(|e| GatewayError::Network { detail: e.to_string() })
    }
}
