//! Picks the `MarketGateway` implementation behind `config.engine.mode`
//! (`"live"` or `"backtest"`). Callers hold a
//! `Arc<dyn MarketGateway>` afterwards and never branch on mode again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::PgPool;

use oflow_broker_live::{LiveBroker, LiveBrokerConfig};
use oflow_broker_sim::SimBroker;
use oflow_calendar::SteppingClock;
use oflow_config::EngineConfig;
use oflow_config::secrets::ResolvedSecrets;
use oflow_gateway::MarketGateway;

/// Builds the live HTTP gateway. Fails if the resolved secrets don't carry a
/// broker API key — callers should have already run
/// `oflow_config::secrets::resolve_secrets_for_mode` with `mode = "live"`,
/// which itself fails closed on a missing key, but this is checked again
/// here since a caller could construct `ResolvedSecrets` by hand in tests.
pub fn build_live_gateway(
    config: &EngineConfig,
    secrets: &ResolvedSecrets,
) -> Result<Arc<dyn MarketGateway>> {
    let api_key = secrets
        .broker_api_key
        .clone()
        .context("build_live_gateway: no broker api key resolved")?;

    let broker_config = LiveBrokerConfig::new(config.broker.base_url.clone(), api_key)
        .with_timeout(Duration::from_secs(10));
    let broker = LiveBroker::new(broker_config).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(Arc::new(broker))
}

/// Builds the simulated gateway used by backtest replay, seeded with
/// `starting_cash` and driven by `clock` (the backtest driver's
/// externally-stepped clock — see `oflow-backtest`).
pub fn build_sim_gateway(
    pool: PgPool,
    clock: SteppingClock,
    config: &EngineConfig,
    starting_cash: f64,
) -> Arc<dyn MarketGateway> {
    Arc::new(SimBroker::new(
        pool,
        clock,
        config.execution.clone(),
        config.risk.min_cash_ratio,
        starting_cash,
    ))
}

/// Validates `config.engine.mode` is one of the two recognised values
/// without constructing anything — used by config validation at startup so
/// a typo surfaces immediately rather than after a gateway is half-built.
pub fn validate_mode(config: &EngineConfig) -> Result<()> {
    match config.engine.mode.as_str() {
        "live" | "backtest" => Ok(()),
        other => bail!("unrecognised engine.mode '{other}'; expected 'live' or 'backtest'"),
    }
}
