//! The position monitor: wakes every `check_interval_seconds`,
//! walks every open position, fetches the minute bars since its last check,
//! and runs them through the exit-priority ladder in `oflow-strategy::exit`.
//! A firing decision places a closing sell order and records the close;
//! otherwise the position's high-water mark is persisted and the loop moves on.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use oflow_audit::AuditWriter;
use oflow_calendar::Clock;
use oflow_config::EngineConfig;
use oflow_db::{OrderStatus, Position, Side};
use oflow_gateway::MarketGateway;
use oflow_strategy::on_position_check;

use crate::shutdown::Shutdown;

pub async fn run_position_monitor(
    pool: PgPool,
    gateway: Arc<dyn MarketGateway>,
    config: EngineConfig,
    run_id: Uuid,
    audit: Arc<Mutex<AuditWriter>>,
    shutdown: Shutdown,
) {
    run_position_monitor_with_clock(pool, gateway, config, run_id, audit, shutdown, Arc::new(oflow_calendar::SystemClock)).await
}

/// Same loop as [`run_position_monitor`] but driven by an injected [`Clock`]
/// so a backtest replay can reuse the exit-ladder evaluation with a
/// `SteppingClock` instead of duplicating it.
pub async fn run_position_monitor_with_clock(
    pool: PgPool,
    gateway: Arc<dyn MarketGateway>,
    config: EngineConfig,
    run_id: Uuid,
    audit: Arc<Mutex<AuditWriter>>,
    shutdown: Shutdown,
    clock: Arc<dyn Clock>,
) {
    let mut ticker = interval(StdDuration::from_secs(config.monitor.check_interval_seconds));

    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            _ = ticker.tick() => {
                if let Err(err) = check_all_positions(&pool, gateway.as_ref(), &config, run_id, &audit, clock.as_ref()).await {
                    warn!(error = %err, "position monitor tick failed");
                }
            }
        }
    }
}

/// Walks every open position and evaluates the exit-priority ladder for
/// each. `oflow-backtest` calls this directly per bar with a `SteppingClock`
/// rather than going through the tick-interval loop above.
pub async fn check_all_positions(
    pool: &PgPool,
    gateway: &dyn MarketGateway,
    config: &EngineConfig,
    run_id: Uuid,
    audit: &Mutex<AuditWriter>,
    clock: &dyn Clock,
) -> anyhow::Result<()> {
    let positions = oflow_db::open_positions(pool).await?;
    let now = clock.now_utc();

    for position in &positions {
        if let Err(err) = check_one_position(pool, gateway, config, run_id, audit, position, now).await {
            warn!(position_id = %position.position_id, error = %err, "position check failed");
        }
    }

    Ok(())
}

async fn check_one_position(
    pool: &PgPool,
    gateway: &dyn MarketGateway,
    config: &EngineConfig,
    run_id: Uuid,
    audit: &Mutex<AuditWriter>,
    position: &Position,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    let lookback = chrono::Duration::seconds(config.monitor.check_interval_seconds as i64).max(chrono::Duration::minutes(1));
    let since = position.open_time_eastern.max(now - lookback);
    let bars = gateway.get_minute_bars(&position.symbol, since, now).await?;
    if bars.is_empty() {
        return Ok(());
    }

    let outcome = on_position_check(position, &bars, &config.exits);

    if (outcome.new_high_water_price - position.high_water_price).abs() > f64::EPSILON {
        oflow_db::update_high_water_price(pool, position.position_id, outcome.new_high_water_price).await?;
    }

    let Some(decision) = outcome.decision else {
        return Ok(());
    };

    let order_result = gateway
        .place_order(&decision.client_id, &position.symbol, Side::Sell, position.shares, decision.exit_price)
        .await?;

    let event = order_result.clone().into_event(now);
    oflow_db::record_order_event(pool, &event).await?;

    if event.status != OrderStatus::Filled {
        warn!(position_id = %position.position_id, status = ?event.status, "exit order did not fill on first attempt");
        return Ok(());
    }

    oflow_db::record_close(
        pool,
        position.position_id,
        &decision.client_id,
        decision.reason.as_str(),
        decision.bar_timestamp,
    )
    .await?;

    info!(
        position_id = %position.position_id,
        symbol = %position.symbol,
        reason = decision.reason.as_str(),
        exit_price = decision.exit_price,
        "position closed"
    );
    audit
        .lock()
        .await
        .append(
            run_id,
            "position",
            "CLOSED",
            json!({
                "position_id": position.position_id,
                "symbol": position.symbol,
                "reason": decision.reason.as_str(),
                "exit_price": decision.exit_price,
            }),
        )?;

    Ok(())
}
