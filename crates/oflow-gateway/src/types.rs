//! Value types returned by [`crate::MarketGateway`] methods. Order-side
//! types (`Side`, `OrderStatus`, `OrderResult`) live in `oflow-db` since the
//! persistence layer and the gateway contract must agree on them bit for
//! bit; re-exported here so callers only need one crate in scope.

use chrono::{DateTime, Utc};

pub use oflow_db::{OrderResult, OrderStatus, Side};
pub use oflow_schemas::MinuteBar;

/// A single quote as of the instant the venue reported it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub symbol_price: f64,
    pub as_of_eastern: DateTime<Utc>,
}

/// Account-level balances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Account {
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
}

/// A single open position as the venue reports it — distinct from
/// `oflow_db::Position`, which is this engine's own book-of-record and
/// carries fields (scheduled exit, high-water mark) no venue knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub shares: i64,
    pub avg_cost: f64,
}
