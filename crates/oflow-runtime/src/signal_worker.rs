//! The signal worker: drains the signal buffer in FIFO
//! order and turns each accepted [`Signal`] into a placed order. Gathers the
//! [`EntryContext`] `on_signal` needs from persistence and the gateway, then
//! performs every side effect the resulting decision implies — the reserve/
//! commit/rollback dance around daily capacity, the gateway order placement,
//! and the append-only bookkeeping in `oflow-db`/`oflow-audit`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use oflow_audit::AuditWriter;
use oflow_calendar::Clock;
use oflow_config::{EngineConfig, GapFallbackPolicy};
use oflow_db::{OrderStatus, Side, Signal};
use oflow_gateway::{GatewayError, MarketGateway};
use oflow_strategy::{compute_exec_time_eastern, on_signal, EntryContext, EntryRejection, ResolvedExec};

use crate::shutdown::Shutdown;

/// How far past `exec_time_eastern` the worker will look for the next
/// available bar under the `next_bar` data-gap fallback.
const EXEC_BAR_LOOKAHEAD: chrono::Duration = chrono::Duration::minutes(15);

/// How far before `exec_time_eastern` the worker will look for a prior bar
/// under the `use_last` data-gap fallback (matches `oflow-broker-sim`'s
/// forward-fill lookback).
const EXEC_BAR_LOOKBACK: chrono::Duration = chrono::Duration::hours(24);

/// Drains `rx` until the channel closes or shutdown is triggered. Each
/// signal is processed to completion (including gateway round-trips) before
/// the next is pulled, preserving FIFO ordering: concurrent signal
/// processing would let a later signal's order land before
/// an earlier one's daily-capacity reservation commits.
pub async fn run_signal_worker(
    pool: PgPool,
    gateway: Arc<dyn MarketGateway>,
    config: EngineConfig,
    run_id: Uuid,
    audit: Arc<Mutex<AuditWriter>>,
    mut rx: mpsc::Receiver<Signal>,
    shutdown: Shutdown,
) {
    run_signal_worker_with_clock(pool, gateway, config, run_id, audit, &mut rx, shutdown, Arc::new(oflow_calendar::SystemClock)).await
}

/// Same loop as [`run_signal_worker`] but driven by an injected [`Clock`]
/// rather than the wall clock, so a backtest replay can reuse it with a
/// `SteppingClock` instead of duplicating the entry pipeline.
pub async fn run_signal_worker_with_clock(
    pool: PgPool,
    gateway: Arc<dyn MarketGateway>,
    config: EngineConfig,
    run_id: Uuid,
    audit: Arc<Mutex<AuditWriter>>,
    rx: &mut mpsc::Receiver<Signal>,
    shutdown: Shutdown,
    clock: Arc<dyn Clock>,
) {
    loop {
        let signal = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            signal = rx.recv() => match signal {
                Some(s) => s,
                None => break,
            },
        };

        if let Err(err) = process_signal(&pool, gateway.as_ref(), &config, run_id, &audit, clock.as_ref(), &signal).await {
            warn!(signal_id = %signal.signal_id, error = %err, "signal processing failed");
        }
    }
}

/// Evaluates one signal against current persistence/gateway state and, on
/// acceptance, places the entry order and records the resulting position.
/// `clock` supplies "now" for blacklist/daily-capacity/open-time math —
/// `oflow-backtest` calls this directly per recorded signal with a
/// `SteppingClock` pinned to the signal's bar.
pub async fn process_signal(
    pool: &PgPool,
    gateway: &dyn MarketGateway,
    config: &EngineConfig,
    run_id: Uuid,
    audit: &Mutex<AuditWriter>,
    clock: &dyn Clock,
    signal: &Signal,
) -> anyhow::Result<()> {
    let now = clock.now_utc();

    let open_positions = oflow_db::open_positions(pool).await?;
    let has_open_position = open_positions.iter().any(|p| p.symbol == signal.symbol);

    let blacklisted = oflow_db::blacklist_until(pool, &signal.symbol, now).await?.is_some();
    let daily_used = oflow_db::daily_used(pool, now.date_naive()).await?;
    let historical_mean_premium_usd = oflow_db::historical_mean_premium(
        pool,
        &signal.symbol,
        now,
        config.entry.historical_lookback_days,
    )
    .await?;

    let account = gateway.get_account().await?;
    let broker_positions = gateway.get_positions().await?;
    let gross_exposure: f64 = broker_positions
        .iter()
        .map(|p| (p.shares as f64 * p.avg_cost).abs())
        .sum();

    let resolved_exec = resolve_exec_price(gateway, signal, config).await?;

    let ctx = EntryContext {
        config,
        has_open_position,
        blacklisted,
        daily_used,
        historical_mean_premium_usd,
        equity: account.equity,
        cash: account.cash,
        gross_exposure,
        resolved_exec,
        macd_histogram: None,
        days_to_earnings: None,
        price_trend_change_pct: None,
    };

    let decision = match on_signal(signal, &ctx) {
        Ok(decision) => decision,
        Err(rejection) => {
            info!(signal_id = %signal.signal_id, symbol = %signal.symbol, reason = ?rejection, "signal rejected");
            audit
                .lock()
                .await
                .append(
                    run_id,
                    "signal",
                    "REJECTED",
                    json!({ "signal_id": signal.signal_id, "reason": rejection_code(rejection) }),
                )?;
            return Ok(());
        }
    };

    let pos_ratio_micros = (decision.pos_ratio * 1_000_000.0).round() as i64;

    let reservation = oflow_db::reserve_daily_capacity(
        pool,
        now.date_naive(),
        pos_ratio_micros,
        oflow_db::to_micros(config.risk.daily_gross_cap),
        config.risk.max_trades_per_day as i32,
    )
    .await?;

    let reservation_id = match reservation {
        oflow_db::ReservationOutcome::Held(id) => id,
        oflow_db::ReservationOutcome::Rejected => {
            info!(signal_id = %signal.signal_id, symbol = %signal.symbol, "daily capacity reservation rejected");
            audit
                .lock()
                .await
                .append(
                    run_id,
                    "signal",
                    "CAPACITY_REJECTED",
                    json!({ "signal_id": signal.signal_id }),
                )?;
            return Ok(());
        }
    };

    let order_result = gateway
        .place_order(&decision.client_id, &decision.symbol, Side::Buy, decision.shares, decision.limit_price)
        .await;

    let order_result = match order_result {
        Ok(result) => result,
        Err(err) => {
            oflow_db::rollback_daily_capacity(pool, reservation_id).await?;
            return Err(anyhow::anyhow!(err));
        }
    };

    let event = order_result.clone().into_event(now);
    oflow_db::record_order_event(pool, &event).await?;

    if event.status != OrderStatus::Filled {
        oflow_db::rollback_daily_capacity(pool, reservation_id).await?;
        audit
            .lock()
            .await
            .append(
                run_id,
                "order",
                "NOT_FILLED",
                json!({ "client_id": decision.client_id, "status": event.status.as_str() }),
            )?;
        return Ok(());
    }

    oflow_db::commit_daily_capacity(pool, reservation_id).await?;

    let open_time_eastern = resolved_exec_time(&decision);
    let scheduled_exit_eastern = compute_scheduled_exit(open_time_eastern, config);

    let fill_price = order_result.avg_price.unwrap_or(decision.limit_price);
    let new_pos = oflow_db::NewPosition {
        open_order_client_id: decision.client_id.clone(),
        symbol: decision.symbol.clone(),
        shares: order_result.filled_shares,
        cost_price: fill_price,
        fees_paid: 0.0,
        open_time_eastern,
        scheduled_exit_eastern,
        triggering_strike: signal.strike_price,
        meta: decision.meta.clone(),
        blacklist_valid_until_eastern: oflow_calendar::eastern_time_on(
            oflow_calendar::add_trading_days(now.date_naive(), config.blacklist.blacklist_days),
            0,
            0,
        ),
    };
    let position_id = oflow_db::record_open(pool, &new_pos).await?;

    info!(position_id = %position_id, symbol = %decision.symbol, shares = decision.shares, "position opened");
    audit
        .lock()
        .await
        .append(
            run_id,
            "position",
            "OPENED",
            json!({ "position_id": position_id, "symbol": decision.symbol, "shares": decision.shares, "cost_price": fill_price }),
        )?;

    Ok(())
}

fn resolved_exec_time(decision: &oflow_strategy::EntryDecision) -> chrono::DateTime<Utc> {
    decision.exec_time_eastern
}

fn compute_scheduled_exit(open_time_eastern: chrono::DateTime<Utc>, config: &EngineConfig) -> chrono::DateTime<Utc> {
    let open_date = oflow_calendar::to_eastern(open_time_eastern).date_naive();
    let exit_date = oflow_calendar::add_trading_days(open_date, config.exits.holding_days);
    let (hour, minute) = parse_time_of_day(&config.exits.exit_time_of_day_eastern);
    oflow_calendar::eastern_time_on(exit_date, hour, minute)
}

fn parse_time_of_day(s: &str) -> (u32, u32) {
    let mut parts = s.splitn(2, ':');
    let hour = parts.next().and_then(|p| p.parse().ok()).unwrap_or(16);
    let minute = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (hour, minute)
}

/// Resolves `limit_price`'s input bar per §7's configured data-gap fallback
/// (`skip`/`next_bar`/`use_last`/`use_realtime`, default `next_bar`). `None`
/// means `on_signal` rejects with `NoExecutionPrice` — the fallback could
/// not produce a usable price under its policy.
async fn resolve_exec_price(
    gateway: &dyn MarketGateway,
    signal: &Signal,
    config: &EngineConfig,
) -> anyhow::Result<Option<ResolvedExec>> {
    let exec_time = compute_exec_time_eastern(signal.signal_time_eastern, config.entry.entry_delay_minutes);

    match config.data.gap_fallback_policy {
        GapFallbackPolicy::Skip => resolve_exact_bar(gateway, signal, exec_time).await,
        GapFallbackPolicy::NextBar => resolve_next_bar(gateway, signal, exec_time).await,
        GapFallbackPolicy::UseLast => resolve_use_last(gateway, signal, exec_time).await,
        GapFallbackPolicy::UseRealtime => resolve_use_realtime(gateway, signal, config, exec_time).await,
    }
}

/// `skip`: only the bar exactly at `exec_time` counts; anything else drops
/// the entry rather than executing off-target.
async fn resolve_exact_bar(
    gateway: &dyn MarketGateway,
    signal: &Signal,
    exec_time: chrono::DateTime<Utc>,
) -> anyhow::Result<Option<ResolvedExec>> {
    let bars = match gateway.get_minute_bars(&signal.symbol, exec_time, exec_time).await {
        Ok(bars) => bars,
        Err(GatewayError::SymbolUnknown { .. }) => return Ok(None),
        Err(err) => return Err(anyhow::anyhow!(err)),
    };

    Ok(bars
        .into_iter()
        .find(|bar| bar.timestamp_utc == exec_time)
        .map(|bar| ResolvedExec { exec_time_eastern: bar.timestamp_utc, raw_close: bar.close }))
}

/// `next_bar` (default): retry at the first bar at or after `exec_time`,
/// within a bounded lookahead.
async fn resolve_next_bar(
    gateway: &dyn MarketGateway,
    signal: &Signal,
    exec_time: chrono::DateTime<Utc>,
) -> anyhow::Result<Option<ResolvedExec>> {
    let bars = match gateway
        .get_minute_bars(&signal.symbol, exec_time, exec_time + EXEC_BAR_LOOKAHEAD)
        .await
    {
        Ok(bars) => bars,
        Err(GatewayError::SymbolUnknown { .. }) => return Ok(None),
        Err(err) => return Err(anyhow::anyhow!(err)),
    };

    Ok(bars
        .into_iter()
        .find(|bar| bar.timestamp_utc >= exec_time)
        .map(|bar| ResolvedExec {
            exec_time_eastern: bar.timestamp_utc,
            raw_close: bar.close,
        }))
}

/// `use_last`: forward-fill from the latest bar at or before `exec_time`,
/// within a bounded lookback (mirrors `oflow-broker-sim`'s fill rule).
async fn resolve_use_last(
    gateway: &dyn MarketGateway,
    signal: &Signal,
    exec_time: chrono::DateTime<Utc>,
) -> anyhow::Result<Option<ResolvedExec>> {
    let bars = match gateway
        .get_minute_bars(&signal.symbol, exec_time - EXEC_BAR_LOOKBACK, exec_time)
        .await
    {
        Ok(bars) => bars,
        Err(GatewayError::SymbolUnknown { .. }) => return Ok(None),
        Err(err) => return Err(anyhow::anyhow!(err)),
    };

    Ok(bars
        .into_iter()
        .filter(|bar| bar.timestamp_utc <= exec_time)
        .last()
        .map(|bar| ResolvedExec { exec_time_eastern: exec_time, raw_close: bar.close }))
}

/// `use_realtime`: live-only — takes the gateway's current quote instead of
/// a historical bar. A backtest's simulated gateway has no "realtime" quote
/// distinct from its bar data, so this policy is unreachable in backtest
/// mode and falls back to `next_bar` there rather than silently misfiring.
async fn resolve_use_realtime(
    gateway: &dyn MarketGateway,
    signal: &Signal,
    config: &EngineConfig,
    exec_time: chrono::DateTime<Utc>,
) -> anyhow::Result<Option<ResolvedExec>> {
    if config.engine.mode != "live" {
        warn!(symbol = %signal.symbol, mode = %config.engine.mode, "use_realtime gap fallback is live-only; falling back to next_bar");
        return resolve_next_bar(gateway, signal, exec_time).await;
    }

    match gateway.get_quote(&signal.symbol).await {
        Ok(quote) => Ok(Some(ResolvedExec { exec_time_eastern: quote.as_of_eastern, raw_close: quote.symbol_price })),
        Err(GatewayError::SymbolUnknown { .. }) | Err(GatewayError::Stale { .. }) => Ok(None),
        Err(err) => Err(anyhow::anyhow!(err)),
    }
}

fn rejection_code(rejection: EntryRejection) -> &'static str {
    match rejection {
        EntryRejection::OutsideEntryWindow => "OUTSIDE_ENTRY_WINDOW",
        EntryRejection::PremiumBelowMinimum => "PREMIUM_BELOW_MINIMUM",
        EntryRejection::PremiumAboveMaximum => "PREMIUM_ABOVE_MAXIMUM",
        EntryRejection::HistoricalPremiumFilter => "HISTORICAL_PREMIUM_FILTER",
        EntryRejection::Blacklisted => "BLACKLISTED",
        EntryRejection::OpenPositionExists => "OPEN_POSITION_EXISTS",
        EntryRejection::DailyTradeCapReached => "DAILY_TRADE_CAP_REACHED",
        EntryRejection::NoExecutionPrice => "NO_EXECUTION_PRICE",
        EntryRejection::RiskRejected => "RISK_REJECTED",
        EntryRejection::Filter(_) => "FILTER_REJECTED",
    }
}

/// The worker's signal-buffer channel is sized from config: bounded so a burst of signals applies backpressure to
/// the ingestion side rather than growing memory without limit.
pub fn signal_channel(capacity: usize) -> (mpsc::Sender<Signal>, mpsc::Receiver<Signal>) {
    mpsc::channel(capacity.max(1))
}
