//! An in-memory `MarketGateway` for fast, DB-free tests. Quotes and bars are
//! whatever the test seeds; fills are immediate at the caller's limit price.
//! `place_order` honors the same idempotency-on-`client_id` contract real
//! gateways must: a repeat call with identical parameters
//! returns the stored result, a repeat call with different parameters is an
//! `IdempotencyConflict`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use oflow_gateway::{
    Account, BrokerPosition, GatewayError, MarketGateway, MinuteBar, OrderResult, OrderStatus,
    Quote, Side,
};

#[derive(Debug, Clone, PartialEq)]
struct PlacedOrder {
    symbol: String,
    side: Side,
    shares: i64,
    limit_price: f64,
    result: OrderResult,
}

#[derive(Default)]
struct State {
    quotes: BTreeMap<String, Quote>,
    bars: BTreeMap<String, Vec<MinuteBar>>,
    orders: BTreeMap<String, PlacedOrder>,
    account: Account,
    positions: Vec<BrokerPosition>,
}

/// Seeded in-memory gateway. Build with [`FakeGateway::new`], seed quotes
/// and bars, then hand an `Arc<dyn MarketGateway>` to whatever the test
/// exercises.
pub struct FakeGateway {
    state: Mutex<State>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                account: Account {
                    equity: 1_000_000.0,
                    cash: 1_000_000.0,
                    buying_power: 1_000_000.0,
                },
                ..State::default()
            }),
        }
    }

    pub fn set_account(&self, account: Account) {
        self.state.lock().unwrap().account = account;
    }

    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        self.state.lock().unwrap().positions = positions;
    }

    pub fn seed_quote(&self, symbol: &str, price: f64, as_of_eastern: DateTime<Utc>) {
        self.state.lock().unwrap().quotes.insert(
            symbol.to_string(),
            Quote {
                symbol_price: price,
                as_of_eastern,
            },
        );
    }

    pub fn seed_bars(&self, symbol: &str, bars: Vec<MinuteBar>) {
        self.state
            .lock()
            .unwrap()
            .bars
            .insert(symbol.to_string(), bars);
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }
}

#[async_trait]
impl MarketGateway for FakeGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn get_quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::SymbolUnknown {
                symbol: symbol.to_string(),
            })
    }

    async fn get_minute_bars(
        &self,
        symbol: &str,
        from_eastern: DateTime<Utc>,
        to_eastern: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, GatewayError> {
        let state = self.state.lock().unwrap();
        let bars = state.bars.get(symbol).cloned().unwrap_or_default();
        Ok(bars
            .into_iter()
            .filter(|b| b.timestamp_utc >= from_eastern && b.timestamp_utc <= to_eastern)
            .collect())
    }

    async fn get_account(&self) -> Result<Account, GatewayError> {
        Ok(self.state.lock().unwrap().account)
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, GatewayError> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn place_order(
        &self,
        client_id: &str,
        symbol: &str,
        side: Side,
        shares: i64,
        limit_price: f64,
    ) -> Result<OrderResult, GatewayError> {
        let mut state = self.state.lock().unwrap();

        if let Some(existing) = state.orders.get(client_id) {
            if existing.symbol == symbol
                && existing.side == side
                && existing.shares == shares
                && (existing.limit_price - limit_price).abs() < f64::EPSILON
            {
                return Ok(existing.result.clone());
            }
            return Err(GatewayError::IdempotencyConflict {
                client_id: client_id.to_string(),
            });
        }

        let result = OrderResult {
            client_id: client_id.to_string(),
            symbol: symbol.to_string(),
            side,
            shares,
            limit_price,
            status: OrderStatus::Filled,
            filled_shares: shares,
            avg_price: Some(limit_price),
            broker_id: Some(client_id.to_string()),
            reject_reason: None,
        };

        state.orders.insert(
            client_id.to_string(),
            PlacedOrder {
                symbol: symbol.to_string(),
                side,
                shares,
                limit_price,
                result: result.clone(),
            },
        );

        Ok(result)
    }

    async fn get_order(&self, client_id: &str) -> Result<OrderResult, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .orders
            .get(client_id)
            .map(|o| o.result.clone())
            .ok_or_else(|| GatewayError::NotFound {
                client_id: client_id.to_string(),
            })
    }
}
