//! The market-gateway abstraction: one async interface for
//! quotes, minute bars, account state, and order placement that the live and
//! simulated brokers both implement identically. Strategy, risk, the
//! position monitor, and reconciliation all talk to a `&dyn MarketGateway`
//! (or a generic `G: MarketGateway`) and never know which one is behind it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::GatewayError;
use crate::types::{Account, BrokerPosition, MinuteBar, OrderResult, Quote, Side};

/// A venue connection, real or simulated. Every method that talks to the
/// venue is `async` — the live implementation makes a genuine network call,
/// the simulated one just awaits immediately; neither bridges a blocking
/// client onto the async runtime.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Establishes the venue session (auth handshake for live, a no-op that
    /// just validates config for simulated). Idempotent: calling it again on
    /// an already-connected gateway is a no-op.
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Tears down the venue session. Never fails — closing an idle or
    /// already-closed connection is always safe.
    async fn disconnect(&self);

    /// Latest trade price for `symbol`. `Stale` if the most recent quote the
    /// venue holds predates the caller's freshness requirement;
    /// `SymbolUnknown` if the venue has never heard of the symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, GatewayError>;

    /// Minute OHLC bars for `symbol` over `[from_eastern, to_eastern]`,
    /// ordered by timestamp ascending. Gaps (e.g. a halted session) are
    /// permitted in the returned sequence; callers forward-fill missing
    /// minutes themselves rather than the gateway inventing synthetic bars.
    async fn get_minute_bars(
        &self,
        symbol: &str,
        from_eastern: DateTime<Utc>,
        to_eastern: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, GatewayError>;

    /// Current account-level equity, cash, and buying power.
    async fn get_account(&self) -> Result<Account, GatewayError>;

    /// Every position the venue currently reports open, regardless of
    /// whether this engine's own book agrees (reconciliation's job is to
    /// compare the two, not this method's).
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, GatewayError>;

    /// Places an order. Idempotent on `client_id`: a repeat call with
    /// identical `(symbol, side, shares, limit_price)` returns the existing
    /// order's current state rather than submitting twice; a repeat call
    /// with *different* arguments for an already-seen `client_id` is an
    /// `IdempotencyConflict` — the caller's bug, not a retry to honor.
    async fn place_order(
        &self,
        client_id: &str,
        symbol: &str,
        side: Side,
        shares: i64,
        limit_price: f64,
    ) -> Result<OrderResult, GatewayError>;

    /// Looks up a previously placed order by `client_id`. `NotFound` if the
    /// venue has never seen this `client_id`.
    async fn get_order(&self, client_id: &str) -> Result<OrderResult, GatewayError>;

    /// Number of NYSE trading days strictly between `from` and `to`
    /// (exclusive of `from`, inclusive of `to`) — used to compute scheduled
    /// exits. A pure calendar calculation with no venue round-trip, so every
    /// implementation can share this default rather than re-deriving it.
    fn count_trading_days_between(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        oflow_calendar::count_trading_days_between(from, to)
    }
}
