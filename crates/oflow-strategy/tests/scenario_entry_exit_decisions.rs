// Strategy decision scenarios. Pure in-process tests: `on_signal`/
// `on_position_check` take no DB or gateway handle, so
// unlike the rest of the workspace's scenario tests these need no
// OFLOW_DATABASE_URL.

use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use oflow_config::{
    BlacklistSection, BrokerSection, DataSection, EngineConfig, EngineSection, EntrySection,
    ExecutionSection, ExitsSection, FiltersSection, MonitorSection, ReconciliationSection,
    RiskSection,
};
use oflow_db::{DailyUsed, Position, Signal};
use oflow_strategy::{on_position_check, on_signal, EntryContext, EntryRejection, ExitReason, ResolvedExec};

fn config() -> EngineConfig {
    EngineConfig {
        engine: EngineSection { mode: "backtest".into() },
        monitor: MonitorSection { check_interval_seconds: 20 },
        entry: EntrySection {
            time_windows: vec![["09:35".into(), "15:45".into()]],
            min_premium_usd: 10_000.0,
            premium_max_usd: 1_000_000.0,
            historical_premium_enabled: true,
            historical_multiplier: 2.0,
            historical_lookback_days: 7,
            entry_delay_minutes: 3,
        },
        risk: RiskSection {
            per_trade_cap: 0.3,
            daily_gross_cap: 0.99,
            max_trades_per_day: 10,
            max_leverage: 1.0,
            min_cash_ratio: 0.0,
        },
        exits: ExitsSection {
            stop_loss: 0.10,
            take_profit: 0.40,
            trailing_stop: 0.08,
            holding_days: 6,
            exit_time_of_day_eastern: "15:00".into(),
        },
        blacklist: BlacklistSection { blacklist_days: 3 },
        execution: ExecutionSection { slippage: 0.0, fee_per_share: 0.005, fee_min: 1.0 },
        reconciliation: ReconciliationSection {
            reconciliation_time_eastern: "17:00".into(),
            auto_fix: true,
        },
        filters: FiltersSection::default(),
        broker: BrokerSection::default(),
        data: DataSection::default(),
    }
}

fn signal(premium: f64) -> Signal {
    Signal {
        signal_id: "sig-xyz".into(),
        symbol: "XYZ".into(),
        premium_usd: premium,
        ask: None,
        contract_id: Some("XYZ240621C00150000".into()),
        option_type: Some("call".into()),
        strike_price: Some(150.0),
        stock_price: Some(148.0),
        signal_time_source: Utc.with_ymd_and_hms(2024, 6, 3, 19, 35, 0).unwrap(),
        signal_time_eastern: Utc.with_ymd_and_hms(2024, 6, 3, 19, 35, 0).unwrap(),
        source_file: "flow.csv".into(),
    }
}

// S2. Historical filter: past 7-day mean premium $50,000, multiplier 2.0.
// A $90,000 signal is rejected; a $120,000 signal is accepted.
#[test]
fn scenario_s2_historical_filter_triggers() {
    let cfg = config();
    let ctx = |premium_history: f64| EntryContext {
        config: &cfg,
        has_open_position: false,
        blacklisted: false,
        daily_used: DailyUsed { trade_count: 0, gross_ratio_micros: 0 },
        historical_mean_premium_usd: Some(premium_history),
        equity: 100_000.0,
        cash: 100_000.0,
        gross_exposure: 0.0,
        resolved_exec: Some(ResolvedExec {
            exec_time_eastern: Utc.with_ymd_and_hms(2024, 6, 3, 19, 38, 0).unwrap(),
            raw_close: 100.0,
        }),
        macd_histogram: None,
        days_to_earnings: None,
        price_trend_change_pct: None,
    };

    let rejected = on_signal(&signal(90_000.0), &ctx(50_000.0));
    assert_eq!(rejected.unwrap_err(), EntryRejection::HistoricalPremiumFilter);

    let accepted = on_signal(&signal(120_000.0), &ctx(50_000.0));
    assert!(accepted.is_ok());
}

// S4. Gap-through stop and take-profit: position opened at cost 100,
// stop_loss=0.10, take_profit=0.40. A single bar has low=80, high=145.
// Expected exit reason TP (priority 3) at 140, not SL.
#[test]
fn scenario_s4_gap_through_picks_higher_priority_take_profit() {
    let cfg = config();
    let position = Position {
        position_id: Uuid::new_v4(),
        open_order_client_id: "buy-1".into(),
        symbol: "XYZ".into(),
        shares: 100,
        cost_price: 100.0,
        fees_paid: 1.0,
        open_time_eastern: Utc.with_ymd_and_hms(2024, 6, 3, 18, 0, 0).unwrap(),
        scheduled_exit_eastern: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        high_water_price: 100.0,
        triggering_strike: None,
        meta: json!({}),
    };
    let bar = oflow_schemas::MinuteBar {
        timestamp_utc: Utc.with_ymd_and_hms(2024, 6, 3, 19, 0, 0).unwrap(),
        open: 100.0,
        high: 145.0,
        low: 80.0,
        close: 120.0,
    };

    let outcome = on_position_check(&position, &[bar], &cfg.exits);
    let decision = outcome.decision.expect("must exit");
    assert_eq!(decision.reason, ExitReason::TakeProfit);
    assert_eq!(decision.exit_price, 140.0);
}

// S5. Scheduled exit after 6 trading days: position opened 2024-06-03
// (Monday) 14:00 ET, holding_days=6, exit_time_of_day=15:00. Scheduled
// exit lands 2024-06-11 (Tuesday after the 6th trading day) at 15:00 ET.
// At 14:59 the monitor holds; at 15:00 it emits TIMED.
#[test]
fn scenario_s5_scheduled_exit_fires_at_configured_time() {
    let cfg = config();
    let open_date = chrono::NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let exit_date = oflow_calendar::add_trading_days(open_date, cfg.exits.holding_days);
    assert_eq!(exit_date, chrono::NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
    let scheduled_exit_eastern = oflow_calendar::eastern_time_on(exit_date, 15, 0);

    let position = Position {
        position_id: Uuid::new_v4(),
        open_order_client_id: "buy-1".into(),
        symbol: "XYZ".into(),
        shares: 100,
        cost_price: 100.0,
        fees_paid: 1.0,
        open_time_eastern: oflow_calendar::eastern_time_on(open_date, 14, 0),
        scheduled_exit_eastern,
        high_water_price: 100.0,
        triggering_strike: None,
        meta: json!({}),
    };

    let before = scheduled_exit_eastern - chrono::Duration::minutes(1);
    let holding_bar = oflow_schemas::MinuteBar {
        timestamp_utc: before,
        open: 100.0,
        high: 101.0,
        low: 99.0,
        close: 100.5,
    };
    let held = on_position_check(&position, &[holding_bar], &cfg.exits);
    assert!(held.decision.is_none());

    let exit_bar = oflow_schemas::MinuteBar {
        timestamp_utc: scheduled_exit_eastern,
        open: 100.0,
        high: 101.0,
        low: 99.0,
        close: 100.0,
    };
    let exited = on_position_check(&position, &[exit_bar], &cfg.exits);
    let decision = exited.decision.expect("must exit at scheduled time");
    assert_eq!(decision.reason, ExitReason::Timed);
}
