//! The replay driver: feeds a fixed list of
//! historical signals and minute bars through the same entry/exit pipeline
//! `oflow-runtime` uses live, but on a `SteppingClock` the driver advances
//! itself instead of the wall clock. Bars must already be present in
//! `oflow-db`'s `md_bars` table (via `oflow-cli`'s market-data ingestion) —
//! this crate only drives the clock and the signal/position event schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use oflow_audit::AuditWriter;
use oflow_calendar::{Clock, SteppingClock};
use oflow_config::EngineConfig;
use oflow_gateway::MarketGateway;
use oflow_runtime::position_monitor::check_all_positions;
use oflow_runtime::signal_worker::process_signal;
use oflow_schemas::RawSignalRecord;
use oflow_strategy::{compute_exec_time_eastern, signal_from_raw};

use crate::types::{BacktestConfig, BacktestError, BacktestReport, EquityPoint};

/// One scheduled replay event. Signals and position-check ticks are merged
/// into a single time-ordered schedule so the clock only ever moves forward.
enum ScheduledEvent {
    Signal(oflow_db::Signal),
    PositionCheck,
}

pub struct BacktestEngine {
    pool: PgPool,
    config: EngineConfig,
    backtest: BacktestConfig,
    audit: Arc<Mutex<AuditWriter>>,
    clock: SteppingClock,
    gateway: Arc<dyn MarketGateway>,
}

impl BacktestEngine {
    /// Builds the replay driver around a fresh simulated gateway pinned to
    /// `start`. `pool` must already have the relevant `md_bars` rows loaded.
    pub fn new(
        pool: PgPool,
        config: EngineConfig,
        backtest: BacktestConfig,
        audit: Arc<Mutex<AuditWriter>>,
        start: DateTime<Utc>,
    ) -> Self {
        let clock = SteppingClock::new(start);
        let gateway = oflow_runtime::build_sim_gateway(
            pool.clone(),
            clock.clone(),
            &config,
            backtest.starting_cash,
        );
        Self { pool, config, backtest, audit, clock, gateway }
    }

    /// Runs the replay over `[from, to]`. `raw_signals` need not be
    /// pre-sorted; they are scheduled at their own `exec_time_eastern`
    /// (signal time plus `entry.entry_delay_minutes`), same as live ingestion.
    pub async fn run(
        &mut self,
        raw_signals: &[RawSignalRecord],
        from_eastern: DateTime<Utc>,
        to_eastern: DateTime<Utc>,
    ) -> Result<BacktestReport, BacktestError> {
        if from_eastern >= to_eastern {
            return Err(BacktestError::EmptyWindow { from: from_eastern, to: to_eastern });
        }

        let mut schedule: Vec<(DateTime<Utc>, ScheduledEvent)> = Vec::new();
        let mut signals_seen = 0usize;

        for (line, raw) in raw_signals.iter().enumerate() {
            let signal = match signal_from_raw(raw, self.backtest.source_tz) {
                Ok(s) => s,
                Err(e) => {
                    return Err(BacktestError::BadSignalRow { line, detail: e.to_string() })
                }
            };
            signals_seen += 1;

            let exec_time =
                compute_exec_time_eastern(signal.signal_time_eastern, self.config.entry.entry_delay_minutes);
            if exec_time < from_eastern || exec_time > to_eastern {
                continue;
            }
            schedule.push((exec_time, ScheduledEvent::Signal(signal)));
        }

        let mut tick = from_eastern;
        while tick <= to_eastern {
            schedule.push((tick, ScheduledEvent::PositionCheck));
            tick += self.backtest.position_check_step;
        }

        schedule.sort_by_key(|(ts, _)| *ts);

        let mut report = BacktestReport {
            equity_curve: Vec::new(),
            signals_seen,
            signals_accepted: 0,
            positions_opened: 0,
            positions_closed: 0,
            starting_cash: self.backtest.starting_cash,
            final_equity: self.backtest.starting_cash,
        };

        for (ts, event) in schedule {
            self.clock.set(ts);

            match event {
                ScheduledEvent::Signal(signal) => {
                    let inserted = oflow_db::insert_signal_if_new(&self.pool, &signal).await?;
                    if !inserted {
                        continue;
                    }

                    let open_before = oflow_db::open_positions(&self.pool).await?.len();
                    if let Err(err) = process_signal(
                        &self.pool,
                        self.gateway.as_ref(),
                        &self.config,
                        self.backtest.run_id,
                        &self.audit,
                        &self.clock,
                        &signal,
                    )
                    .await
                    {
                        warn!(signal_id = %signal.signal_id, error = %err, "replay: signal processing failed");
                        continue;
                    }
                    let open_after = oflow_db::open_positions(&self.pool).await?.len();
                    if open_after > open_before {
                        report.signals_accepted += 1;
                        report.positions_opened += 1;
                    }
                }
                ScheduledEvent::PositionCheck => {
                    let open_before = oflow_db::open_positions(&self.pool).await?.len();
                    if let Err(err) = check_all_positions(
                        &self.pool,
                        self.gateway.as_ref(),
                        &self.config,
                        self.backtest.run_id,
                        &self.audit,
                        &self.clock,
                    )
                    .await
                    {
                        warn!(error = %err, "replay: position check tick failed");
                        continue;
                    }
                    let open_after = oflow_db::open_positions(&self.pool).await?.len();
                    if open_after < open_before {
                        report.positions_closed += open_before - open_after;
                    }
                }
            }

            let account = self
                .gateway
                .get_account()
                .await
                .map_err(|e| BacktestError::Db(anyhow::anyhow!(e)))?;
            report.equity_curve.push(EquityPoint {
                ts_eastern: self.clock.now_utc(),
                equity: account.equity,
                cash: account.cash,
            });
            report.final_equity = account.equity;
        }

        info!(
            signals_seen = report.signals_seen,
            signals_accepted = report.signals_accepted,
            positions_opened = report.positions_opened,
            positions_closed = report.positions_closed,
            final_equity = report.final_equity,
            "backtest replay complete"
        );

        Ok(report)
    }
}
