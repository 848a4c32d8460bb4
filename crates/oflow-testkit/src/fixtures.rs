//! Deterministic config/signal fixtures shared by scenario tests across
//! crates, so each test file doesn't hand-roll its own YAML block.

use oflow_config::{load_layered_yaml_from_strings, EngineConfig};
use oflow_schemas::{RawOptionSide, RawOptionType, RawSignalRecord};

/// A permissive base config: wide entry window, no historical-premium
/// filter, loose risk/exit ratios. Tests override individual fields on the
/// returned `EngineConfig` as needed.
pub fn base_engine_config() -> EngineConfig {
    const YAML: &str = r#"
engine:
  mode: "backtest"
monitor:
  check_interval_seconds: 20
entry:
  time_windows:
    - ["00:00", "23:59"]
  min_premium_usd: 1000.0
  premium_max_usd: 250000.0
  historical_premium_enabled: false
  historical_multiplier: 2.0
  historical_lookback_days: 20
  entry_delay_minutes: 1
risk:
  per_trade_cap: 0.5
  daily_gross_cap: 0.9
  max_trades_per_day: 10
  max_leverage: 1.0
  min_cash_ratio: 0.05
exits:
  stop_loss: 0.5
  take_profit: 0.5
  trailing_stop: 0.5
  holding_days: 30
  exit_time_of_day_eastern: "15:55"
blacklist:
  blacklist_days: 3
execution:
  slippage: 0.001
  fee_per_share: 0.0
  fee_min: 0.0
reconciliation:
  reconciliation_time_eastern: "17:00"
  auto_fix: true
"#;
    load_layered_yaml_from_strings(&[YAML])
        .expect("fixture yaml parses")
        .into_engine_config()
        .expect("fixture config validates")
}

/// A single-contract ask-side signal for `symbol` at `date`/`time` (Eastern,
/// `"YYYY-MM-DD"`/`"HH:MM:SS"`), with a premium well above any reasonable
/// `min_premium_usd` floor.
pub fn raw_signal(symbol: &str, date: &str, time: &str, premium_usd: f64) -> RawSignalRecord {
    RawSignalRecord {
        date: date.to_string(),
        time: time.to_string(),
        underlying_symbol: symbol.to_string(),
        side: RawOptionSide::Ask,
        contract: format!("{symbol}_FIXTURE_CALL"),
        strike_price: 100.0,
        option_type: RawOptionType::Call,
        expiry_date: "2099-12-31".to_string(),
        dte: 30,
        stock_price: 100.0,
        premium: premium_usd,
        size: 10,
        volume: 500,
        oi: 1000,
        source_file: "fixture.csv".to_string(),
    }
}
