//! `on_signal`: the pure entry decision function. Takes an
//! explicit [`EntryContext`] carrying everything persistence/gateway reads
//! would otherwise fetch as ambient state — the caller (the signal worker in
//! `oflow-runtime`) gathers that context and performs every side effect the
//! returned [`EntryDecision`] implies.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::{json, Value};

use oflow_config::EngineConfig;
use oflow_db::{from_micros, to_micros, DailyUsed, Signal};
use oflow_risk::{evaluate, scale_down_to_fit, RiskCheckInput, RiskLimits};

use crate::fingerprint;

/// The smallest share count `scale_down_to_fit` will try before giving up.
/// A position of zero or negative shares is meaningless, so 1 is the floor
/// regardless of account size.
const MIN_SHARES: i64 = 1;

/// The minute-bar price `on_signal` resolves `limit_price` from, already
/// selected by the caller according to the `exec_time_eastern` data-gap
/// fallback policy (`skip`/`next_bar`/`use_last`/`use_realtime`).
/// A caller unable to resolve any bar under its fallback passes `None` for
/// `EntryContext::resolved_exec`, which this function treats as a rejection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedExec {
    pub exec_time_eastern: DateTime<Utc>,
    /// The raw bar close before slippage is applied.
    pub raw_close: f64,
}

/// Everything `on_signal` needs besides the signal itself, gathered by the
/// caller from persistence, the gateway, and the active config.
pub struct EntryContext<'a> {
    pub config: &'a EngineConfig,
    pub has_open_position: bool,
    /// Already resolved against the blacklist window's expiry — a symbol
    /// whose blacklist row exists but has lapsed arrives here as `false`.
    pub blacklisted: bool,
    pub daily_used: DailyUsed,
    /// Mean premium for this symbol over the configured lookback, or `None`
    /// if no history exists yet (the historical filter fails open in that case).
    pub historical_mean_premium_usd: Option<f64>,
    pub equity: f64,
    pub cash: f64,
    pub gross_exposure: f64,
    pub resolved_exec: Option<ResolvedExec>,
    /// `None` when the caller has no MACD reading for this symbol/bar; the
    /// filter fails open rather than rejecting (same convention as
    /// `historical_mean_premium_usd`).
    pub macd_histogram: Option<f64>,
    /// `None` when no earnings-calendar lookup is available; fails open.
    pub days_to_earnings: Option<i64>,
    /// `None` when no trend reading is available; fails open.
    pub price_trend_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Macd,
    EarningsWindow,
    PriceTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRejection {
    OutsideEntryWindow,
    PremiumBelowMinimum,
    PremiumAboveMaximum,
    HistoricalPremiumFilter,
    Blacklisted,
    OpenPositionExists,
    DailyTradeCapReached,
    NoExecutionPrice,
    RiskRejected,
    Filter(FilterKind),
}

#[derive(Debug, Clone)]
pub struct EntryDecision {
    pub symbol: String,
    pub shares: i64,
    pub limit_price: f64,
    pub exec_time_eastern: DateTime<Utc>,
    pub pos_ratio: f64,
    pub client_id: String,
    pub meta: Value,
}

/// `exec_time_eastern = signal_time_eastern + entry_delay`, rounded up to
/// the next whole-minute bar boundary.
pub fn compute_exec_time_eastern(
    signal_time_eastern: DateTime<Utc>,
    entry_delay_minutes: u32,
) -> DateTime<Utc> {
    let delayed = signal_time_eastern + Duration::minutes(entry_delay_minutes as i64);
    let floored = delayed
        - Duration::seconds(delayed.second() as i64)
        - Duration::nanoseconds(delayed.nanosecond() as i64);
    if floored == delayed {
        floored
    } else {
        floored + Duration::minutes(1)
    }
}

fn eastern_time_of_day(ts: DateTime<Utc>) -> String {
    oflow_calendar::to_eastern(ts).format("%H:%M").to_string()
}

fn within_entry_window(signal_time_eastern: DateTime<Utc>, windows: &[[String; 2]]) -> bool {
    let tod = eastern_time_of_day(signal_time_eastern);
    windows.iter().any(|[open, close]| &tod >= open && &tod <= close)
}

pub fn on_signal(signal: &Signal, ctx: &EntryContext) -> Result<EntryDecision, EntryRejection> {
    let entry = &ctx.config.entry;
    let risk = &ctx.config.risk;
    let filters = &ctx.config.filters;

    if !within_entry_window(signal.signal_time_eastern, &entry.time_windows) {
        return Err(EntryRejection::OutsideEntryWindow);
    }
    if signal.premium_usd < entry.min_premium_usd {
        return Err(EntryRejection::PremiumBelowMinimum);
    }
    if signal.premium_usd > entry.premium_max_usd {
        return Err(EntryRejection::PremiumAboveMaximum);
    }
    if entry.historical_premium_enabled {
        if let Some(mean) = ctx.historical_mean_premium_usd {
            if signal.premium_usd <= entry.historical_multiplier * mean {
                return Err(EntryRejection::HistoricalPremiumFilter);
            }
        }
        // No history yet: the filter fails open.
    }
    if ctx.blacklisted {
        return Err(EntryRejection::Blacklisted);
    }
    if ctx.has_open_position {
        return Err(EntryRejection::OpenPositionExists);
    }
    if ctx.daily_used.trade_count >= risk.max_trades_per_day as i32 {
        return Err(EntryRejection::DailyTradeCapReached);
    }

    let resolved = ctx.resolved_exec.ok_or(EntryRejection::NoExecutionPrice)?;
    let limit_price = resolved.raw_close * (1.0 + ctx.config.execution.slippage);

    let daily_gross_ratio_used = from_micros(ctx.daily_used.gross_ratio_micros);
    let remaining_daily_cap = (risk.daily_gross_cap - daily_gross_ratio_used).max(0.0);
    let target_notional = (risk.per_trade_cap * ctx.equity).min(remaining_daily_cap * ctx.equity);
    let shares = (target_notional / limit_price).floor() as i64;
    if shares < MIN_SHARES {
        return Err(EntryRejection::RiskRejected);
    }

    let limits = RiskLimits {
        daily_gross_cap: risk.daily_gross_cap,
        max_leverage: risk.max_leverage,
        min_cash_ratio: risk.min_cash_ratio,
    };
    let input = RiskCheckInput {
        equity: ctx.equity,
        cash: ctx.cash,
        gross_exposure: ctx.gross_exposure,
        daily_gross_ratio_used,
        shares,
        limit_price,
    };

    let shares = if evaluate(&limits, &input).passes {
        shares
    } else {
        match scale_down_to_fit(&limits, &input, MIN_SHARES) {
            Some(fitted) => fitted,
            None => return Err(EntryRejection::RiskRejected),
        }
    };

    // Each optional filter fails open when its indicator input is absent
    // (same convention as the historical-premium filter above) rather than
    // rejecting every signal whenever a caller can't supply the reading.
    if filters.macd.enabled {
        if let Some(h) = ctx.macd_histogram {
            if h < filters.macd.min_histogram {
                return Err(EntryRejection::Filter(FilterKind::Macd));
            }
        }
    }
    if filters.earnings_window.enabled {
        if let Some(days) = ctx.days_to_earnings {
            if days < filters.earnings_window.exclude_within_days as i64 {
                return Err(EntryRejection::Filter(FilterKind::EarningsWindow));
            }
        }
    }
    if filters.price_trend.enabled {
        if let Some(pct) = ctx.price_trend_change_pct {
            if pct < filters.price_trend.min_change_pct {
                return Err(EntryRejection::Filter(FilterKind::PriceTrend));
            }
        }
    }

    let pos_ratio = (shares as f64 * limit_price) / ctx.equity;
    let client_id = fingerprint::client_id(
        &signal.signal_id,
        "BUY",
        &resolved.exec_time_eastern.to_rfc3339(),
    );

    let meta = json!({
        "signal_id": signal.signal_id,
        "contract_id": signal.contract_id,
        "option_type": signal.option_type,
        "triggering_strike_micros": signal.strike_price.map(to_micros),
    });

    Ok(EntryDecision {
        symbol: signal.symbol.clone(),
        shares,
        limit_price,
        exec_time_eastern: resolved.exec_time_eastern,
        pos_ratio,
        client_id,
        meta,
    })
}
