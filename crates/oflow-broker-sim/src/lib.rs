//! Simulated `MarketGateway` for backtesting and tests.
//!
//! Holds an `oflow_calendar::SteppingClock` pointer the backtest driver
//! advances externally; every query answers as of that pointer rather than
//! the wall clock. Minute bars come from `oflow-db`'s canonical bar store
//! (`fetch_md_bars`); `place_order` fills at the close of the bar containing
//! `current_eastern`, adjusted by fixed slippage and a per-share fee with a
//! floor, and maintains its own cash/positions ledger.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;

use oflow_calendar::SteppingClock;
use oflow_config::ExecutionSection;
use oflow_gateway::{
    Account, BrokerPosition, GatewayError, MarketGateway, MinuteBar, OrderResult, OrderStatus,
    Quote, Side,
};

/// How far back `place_order`/`get_quote` will look for the last available
/// bar when `current_eastern` lands in a data gap.
const FORWARD_FILL_LOOKBACK: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy)]
struct LedgerPosition {
    shares: i64,
    avg_cost: f64,
}

#[derive(Debug, Default)]
struct Ledger {
    cash: f64,
    positions: BTreeMap<String, LedgerPosition>,
    orders: BTreeMap<String, OrderResult>,
}

impl Ledger {
    fn book_equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|p| p.shares as f64 * p.avg_cost)
                .sum::<f64>()
    }
}

/// Deterministic in-memory simulated broker.
pub struct SimBroker {
    pool: PgPool,
    clock: SteppingClock,
    execution: ExecutionSection,
    min_cash_ratio: f64,
    ledger: Mutex<Ledger>,
}

impl SimBroker {
    pub fn new(
        pool: PgPool,
        clock: SteppingClock,
        execution: ExecutionSection,
        min_cash_ratio: f64,
        starting_cash: f64,
    ) -> Self {
        Self {
            pool,
            clock,
            execution,
            min_cash_ratio,
            ledger: Mutex::new(Ledger {
                cash: starting_cash,
                ..Ledger::default()
            }),
        }
    }

    fn fee_for(&self, shares: i64) -> f64 {
        (self.execution.fee_per_share * shares as f64).max(self.execution.fee_min)
    }

    /// Last complete minute bar at or before `at`, searched back up to
    /// [`FORWARD_FILL_LOOKBACK`]. `None` means the venue has no data for
    /// this symbol anywhere in that window.
    async fn bar_at(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<oflow_db::MdBarRow>, GatewayError> {
        let args = oflow_db::FetchMdBarsArgs {
            timeframe: "1m".to_string(),
            symbols: vec![symbol.to_string()],
            start_end_ts: Some((at - FORWARD_FILL_LOOKBACK).timestamp()),
            end_end_ts: Some(at.timestamp()),
            require_complete: true,
        };
        let rows = oflow_db::fetch_md_bars(&self.pool, args)
            .await
            .map_err(|e| GatewayError::Network { detail: e.to_string() })?;
        Ok(rows.into_iter().last())
    }

    fn row_close(row: &oflow_db::MdBarRow) -> f64 {
        oflow_db::from_micros(row.close_micros)
    }

    fn row_as_bar(row: &oflow_db::MdBarRow) -> MinuteBar {
        MinuteBar {
            timestamp_utc: Utc.timestamp_opt(row.end_ts, 0).single().expect("valid end_ts"),
            open: oflow_db::from_micros(row.open_micros),
            high: oflow_db::from_micros(row.high_micros),
            low: oflow_db::from_micros(row.low_micros),
            close: oflow_db::from_micros(row.close_micros),
        }
    }

    /// Fill price for `side` at the given bar close: buys slip up, sells
    /// slip down.
    fn fill_price(&self, close: f64, side: Side) -> f64 {
        match side {
            Side::Buy => close * (1.0 + self.execution.slippage),
            Side::Sell => close * (1.0 - self.execution.slippage),
        }
    }
}

#[async_trait]
impl MarketGateway for SimBroker {
    async fn connect(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn get_quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        let now = self.clock.now_utc();
        let row = self.bar_at(symbol, now).await?.ok_or_else(|| GatewayError::SymbolUnknown {
            symbol: symbol.to_string(),
        })?;
        Ok(Quote {
            symbol_price: Self::row_close(&row),
            as_of_eastern: now,
        })
    }

    async fn get_minute_bars(
        &self,
        symbol: &str,
        from_eastern: DateTime<Utc>,
        to_eastern: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, GatewayError> {
        let args = oflow_db::FetchMdBarsArgs {
            timeframe: "1m".to_string(),
            symbols: vec![symbol.to_string()],
            start_end_ts: Some(from_eastern.timestamp()),
            end_end_ts: Some(to_eastern.timestamp()),
            require_complete: true,
        };
        let rows = oflow_db::fetch_md_bars(&self.pool, args)
            .await
            .map_err(|e| GatewayError::Network { detail: e.to_string() })?;
        Ok(rows.iter().map(Self::row_as_bar).collect())
    }

    async fn get_account(&self) -> Result<Account, GatewayError> {
        let ledger = self.ledger.lock().expect("sim broker ledger poisoned");
        let equity = ledger.book_equity();
        Ok(Account {
            equity,
            cash: ledger.cash,
            buying_power: ledger.cash,
        })
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, GatewayError> {
        let ledger = self.ledger.lock().expect("sim broker ledger poisoned");
        Ok(ledger
            .positions
            .iter()
            .map(|(symbol, p)| BrokerPosition {
                symbol: symbol.clone(),
                shares: p.shares,
                avg_cost: p.avg_cost,
            })
            .collect())
    }

    async fn place_order(
        &self,
        client_id: &str,
        symbol: &str,
        side: Side,
        shares: i64,
        limit_price: f64,
    ) -> Result<OrderResult, GatewayError> {
        if let Some(existing) = self
            .ledger
            .lock()
            .expect("sim broker ledger poisoned")
            .orders
            .get(client_id)
        {
            if existing.symbol == symbol && existing.side == side && existing.shares == shares {
                return Ok(existing.clone());
            }
            return Err(GatewayError::IdempotencyConflict {
                client_id: client_id.to_string(),
            });
        }

        let now = self.clock.now_utc();
        let bar = self.bar_at(symbol, now).await?.ok_or_else(|| GatewayError::SymbolUnknown {
            symbol: symbol.to_string(),
        })?;
        let fill = self.fill_price(Self::row_close(&bar), side);
        let fee = self.fee_for(shares);
        let gross = fill * shares as f64;

        let mut ledger = self.ledger.lock().expect("sim broker ledger poisoned");

        let cash_after = match side {
            Side::Buy => ledger.cash - gross - fee,
            Side::Sell => ledger.cash + gross - fee,
        };

        let mut positions_after = ledger.positions.clone();
        let entry = positions_after.entry(symbol.to_string()).or_insert(LedgerPosition {
            shares: 0,
            avg_cost: 0.0,
        });
        match side {
            Side::Buy => {
                let total_cost = entry.avg_cost * entry.shares as f64 + fill * shares as f64;
                entry.shares += shares;
                entry.avg_cost = if entry.shares == 0 { 0.0 } else { total_cost / entry.shares as f64 };
            }
            Side::Sell => {
                entry.shares -= shares;
                if entry.shares == 0 {
                    entry.avg_cost = 0.0;
                }
            }
        }
        let equity_after = cash_after
            + positions_after
                .values()
                .map(|p| p.shares as f64 * p.avg_cost)
                .sum::<f64>();

        if side == Side::Buy && (cash_after / equity_after) < self.min_cash_ratio {
            let result = OrderResult {
                client_id: client_id.to_string(),
                symbol: symbol.to_string(),
                side,
                shares,
                limit_price,
                status: OrderStatus::Rejected,
                filled_shares: 0,
                avg_price: None,
                broker_id: Some(client_id.to_string()),
                reject_reason: Some("INSUFFICIENT_FUNDS".to_string()),
            };
            ledger.orders.insert(client_id.to_string(), result.clone());
            return Ok(result);
        }

        ledger.cash = cash_after;
        ledger.positions = positions_after;

        let result = OrderResult {
            client_id: client_id.to_string(),
            symbol: symbol.to_string(),
            side,
            shares,
            limit_price,
            status: OrderStatus::Filled,
            filled_shares: shares,
            avg_price: Some(fill),
            broker_id: Some(client_id.to_string()),
            reject_reason: None,
        };
        ledger.orders.insert(client_id.to_string(), result.clone());
        Ok(result)
    }

    async fn get_order(&self, client_id: &str) -> Result<OrderResult, GatewayError> {
        self.ledger
            .lock()
            .expect("sim broker ledger poisoned")
            .orders
            .get(client_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                client_id: client_id.to_string(),
            })
    }
}
