use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Replay-specific knobs on top of the engine's own [`oflow_config::EngineConfig`].
/// The replay driver reuses the live entry/exit/risk config verbatim; it
/// only needs to know how to seed the simulated broker and how coarsely to
/// step the clock.
#[derive(Clone, Debug)]
pub struct BacktestConfig {
    pub run_id: Uuid,
    /// Starting cash handed to `oflow-broker-sim`'s ledger.
    pub starting_cash: f64,
    /// Timezone the input signals' `date`/`time` columns are expressed in.
    pub source_tz: chrono_tz::Tz,
    /// How far the clock advances per tick while scanning for position-exit
    /// checks between signal events. Matches `monitor.check_interval_seconds`
    /// in spirit but is a replay-only parameter since a backtest has no wall
    /// clock to tick against.
    pub position_check_step: chrono::Duration,
}

impl BacktestConfig {
    pub fn new(run_id: Uuid, starting_cash: f64) -> Self {
        Self {
            run_id,
            starting_cash,
            source_tz: chrono_tz::America::New_York,
            position_check_step: chrono::Duration::minutes(5),
        }
    }
}

/// One point on the replay's equity curve, sampled after every dispatched
/// event (signal processed or position-check tick).
#[derive(Clone, Debug, PartialEq)]
pub struct EquityPoint {
    pub ts_eastern: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
}

/// Summary of a completed replay. Unlike the live engine, a backtest has a
/// defined end: this is what `oflow-cli backtest run` prints and what
/// [`crate::write_report`] persists into the run's export directory.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestReport {
    pub equity_curve: Vec<EquityPoint>,
    pub signals_seen: usize,
    pub signals_accepted: usize,
    pub positions_opened: usize,
    pub positions_closed: usize,
    pub starting_cash: f64,
    pub final_equity: f64,
}

impl BacktestReport {
    pub fn total_return_pct(&self) -> f64 {
        if self.starting_cash == 0.0 {
            return 0.0;
        }
        (self.final_equity - self.starting_cash) / self.starting_cash * 100.0
    }
}

#[derive(Debug)]
pub enum BacktestError {
    EmptyWindow { from: DateTime<Utc>, to: DateTime<Utc> },
    BadSignalRow { line: usize, detail: String },
    Db(anyhow::Error),
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BacktestError::EmptyWindow { from, to } => {
                write!(f, "backtest window is empty: from {from} must be before to {to}")
            }
            BacktestError::BadSignalRow { line, detail } => {
                write!(f, "failed to parse signal row {line}: {detail}")
            }
            BacktestError::Db(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BacktestError {}

impl From<anyhow::Error> for BacktestError {
    fn from(e: anyhow::Error) -> Self {
        BacktestError::Db(e)
    }
}
