//! Writes a completed [`BacktestReport`] into a run export directory
//! alongside the `manifest.json`/`audit.jsonl` `oflow-audit::init_run_artifacts`
//! already created (equity_curve.csv, metrics.json).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::types::BacktestReport;

#[derive(Debug, Clone, Serialize)]
struct BacktestMetrics {
    schema_version: i32,
    signals_seen: usize,
    signals_accepted: usize,
    positions_opened: usize,
    positions_closed: usize,
    starting_cash: f64,
    final_equity: f64,
    total_return_pct: f64,
}

/// Write `equity_curve.csv` and `metrics.json` into an existing run
/// directory. No wall-clock time is used; timestamps come from the
/// report's own equity-curve data.
pub fn write_report(run_dir: &Path, report: &BacktestReport) -> Result<()> {
    fs::create_dir_all(run_dir)
        .with_context(|| format!("create backtest artifacts dir failed: {}", run_dir.display()))?;

    let mut eq_csv = String::from("ts_eastern,equity,cash\n");
    for point in &report.equity_curve {
        eq_csv.push_str(&format!(
            "{},{},{}\n",
            point.ts_eastern.to_rfc3339(),
            point.equity,
            point.cash
        ));
    }
    let eq_path = run_dir.join("equity_curve.csv");
    fs::write(&eq_path, eq_csv)
        .with_context(|| format!("write equity_curve.csv failed: {}", eq_path.display()))?;

    let metrics = BacktestMetrics {
        schema_version: 1,
        signals_seen: report.signals_seen,
        signals_accepted: report.signals_accepted,
        positions_opened: report.positions_opened,
        positions_closed: report.positions_closed,
        starting_cash: report.starting_cash,
        final_equity: report.final_equity,
        total_return_pct: report.total_return_pct(),
    };

    let metrics_path = run_dir.join("metrics.json");
    let json = serde_json::to_string_pretty(&metrics).context("serialize metrics failed")?;
    fs::write(&metrics_path, format!("{json}\n"))
        .with_context(|| format!("write metrics.json failed: {}", metrics_path.display()))?;

    Ok(())
}
