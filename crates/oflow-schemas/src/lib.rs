//! Wire-level shapes shared across crate boundaries.
//!
//! These are the shapes that cross a process or transport boundary: the
//! record handed to us by the external file watcher/parser, minute bars as
//! returned by a market-data provider, and the broker's JSON view of orders,
//! positions, and account state. Crates that own a domain concept (order
//! status, side, exit reason) define their own typed enums local to that
//! domain rather than importing from here — this crate intentionally stays
//! thin so it never becomes a dumping ground for business logic types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The record produced by the external file watcher/CSV-or-TXT parser.
/// Out of scope per the engine's contract: only the shape is relied upon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignalRecord {
    pub date: String,
    pub time: String,
    pub underlying_symbol: String,
    pub side: RawOptionSide,
    pub contract: String,
    pub strike_price: f64,
    pub option_type: RawOptionType,
    pub expiry_date: String,
    pub dte: i32,
    pub stock_price: f64,
    pub premium: f64,
    pub size: i64,
    pub volume: i64,
    pub oi: i64,
    pub source_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RawOptionSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawOptionType {
    Call,
    Put,
}

/// A single minute OHLC bar, an element of the ordered sequence returned by
/// `get_minute_bars`. `timestamp_utc` is the bar's close instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    pub timestamp_utc: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Wire-level broker order as returned by a brokerage daemon's REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrderDto {
    pub broker_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub qty: i64,
    pub filled_qty: i64,
    pub avg_fill_price: Option<f64>,
    pub limit_price: Option<f64>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
    pub reject_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPositionDto {
    pub symbol: String,
    pub qty: i64,
    pub avg_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccountDto {
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
}

/// Wire-level quote as returned by a brokerage daemon's `/v1/quotes/{symbol}`
/// endpoint. `stale` is set by the daemon itself when its own upstream feed
/// has gone quiet past its configured freshness bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerQuoteDto {
    pub symbol: String,
    pub price: f64,
    pub as_of_utc: DateTime<Utc>,
    #[serde(default)]
    pub stale: bool,
}
