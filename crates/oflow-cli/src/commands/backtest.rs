//! `oflow backtest run`: replays a fixed CSV of signals through the live
//! entry/exit pipeline on a stepped clock and writes the resulting report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use uuid::Uuid;

use oflow_audit::{AuditWriter, InitRunArtifactsArgs};
use oflow_backtest::{load_raw_signals_csv, write_report, BacktestConfig, BacktestEngine};
use oflow_config::{ConfigMode, UnusedKeyPolicy};

const SCHEMA_VERSION: i32 = 1;

/// Execute `oflow backtest run`.
#[allow(clippy::too_many_arguments)]
pub async fn backtest_run(
    config_paths: Vec<String>,
    engine_id: String,
    signals_csv: String,
    from: String,
    to: String,
    starting_cash: f64,
    source_tz: String,
    exports_root: String,
) -> Result<()> {
    let paths: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = oflow_config::load_layered_yaml(&paths)?;
    let config = loaded.clone().into_engine_config()?;

    oflow_runtime::validate_mode(&config)?;
    if config.engine.mode != "backtest" {
        anyhow::bail!(
            "`oflow backtest run` requires engine.mode = \"backtest\" in the loaded config, got '{}'",
            config.engine.mode
        );
    }

    let report = oflow_config::report_unused_keys(ConfigMode::Backtest, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        for pointer in &report.unused_leaf_pointers {
            eprintln!("warning: config key unused in backtest mode: {pointer}");
        }
    }

    let source_tz: Tz = source_tz
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid --source-tz '{}'", source_tz))?;

    let from_eastern = parse_date_start_of_day(&from, source_tz)?;
    let to_eastern = parse_date_start_of_day(&to, source_tz)?;

    let signals = load_raw_signals_csv(&PathBuf::from(&signals_csv))
        .with_context(|| format!("load signals csv: {signals_csv}"))?;

    let pool = oflow_db::connect_from_env().await?;

    let run_id = Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        format!("oflow-cli.backtest.v1|{}|{}|{}|{}", engine_id, loaded.config_hash, from, to).as_bytes(),
    );

    let exports_root = PathBuf::from(exports_root);
    let artifacts = oflow_audit::init_run_artifacts(InitRunArtifactsArgs {
        exports_root: &exports_root,
        schema_version: SCHEMA_VERSION,
        run_id,
        engine_id: &engine_id,
        mode: "backtest",
        git_hash: "n/a",
        config_hash: &loaded.config_hash,
        host_fingerprint: "n/a",
    })?;

    let audit = Arc::new(Mutex::new(AuditWriter::new(
        artifacts.run_dir.join("audit.jsonl"),
        true,
    )?));

    let backtest_config = BacktestConfig {
        run_id,
        starting_cash,
        source_tz,
        position_check_step: chrono::Duration::minutes(5),
    };

    let mut engine = BacktestEngine::new(pool, config, backtest_config, audit, from_eastern);
    let report = engine
        .run(&signals, from_eastern, to_eastern)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    write_report(&artifacts.run_dir, &report)?;

    println!("run_id={}", run_id);
    println!("run_dir={}", artifacts.run_dir.display());
    println!(
        "signals_seen={} signals_accepted={} positions_opened={} positions_closed={}",
        report.signals_seen, report.signals_accepted, report.positions_opened, report.positions_closed
    );
    println!(
        "starting_cash={:.2} final_equity={:.2} total_return_pct={:.4}",
        report.starting_cash,
        report.final_equity,
        report.total_return_pct()
    );

    Ok(())
}

fn parse_date_start_of_day(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))?;
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let local = tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous local midnight for {s} in {tz}"))?;
    Ok(local.with_timezone(&Utc))
}
