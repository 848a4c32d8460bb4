//! End-of-day reconciliation: compare the local book against
//! the broker's view, produce a report, and — when enabled — plan the
//! synthetic fixes that bring the two back into agreement. Pure comparison
//! logic; the caller (the reconciliation worker in `oflow-runtime`) supplies
//! both snapshots and executes whatever plan comes back.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use oflow_db::Position;
use oflow_gateway::{Account, BrokerPosition};

#[derive(Debug, Clone, Serialize)]
pub struct ShareMismatch {
    pub symbol: String,
    pub local_shares: i64,
    pub broker_shares: i64,
}

/// What the reconciliation worker hands to [`reconcile`]: the local book's
/// open positions, the broker's reported positions, its current account
/// snapshot, and the account snapshot from the previous reconciliation run
/// (`None` on the very first run, in which case `equity_delta`/`cash_delta`
/// are reported as zero rather than compared against nothing).
pub struct ReconciliationInput {
    pub date_eastern: NaiveDate,
    pub local: Vec<Position>,
    pub broker: Vec<BrokerPosition>,
    pub broker_account: Account,
    pub previous_broker_account: Option<Account>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub date_eastern: NaiveDate,
    /// Symbols the local book holds open that the broker does not report.
    pub extras_local: Vec<String>,
    /// Symbols the broker reports that the local book has no open position for.
    pub extras_broker: Vec<String>,
    pub share_mismatches: Vec<ShareMismatch>,
    pub equity_delta: f64,
    pub cash_delta: f64,
}

impl Report {
    /// The fixed-point property reconciliation must satisfy: running it
    /// twice with no intervening activity must yield an empty report on the
    /// second run.
    pub fn is_clean(&self) -> bool {
        self.extras_local.is_empty()
            && self.extras_broker.is_empty()
            && self.share_mismatches.is_empty()
    }
}

/// Computes the symmetric difference by symbol and the account delta against
/// the previous run. Deterministic: symbol lists are always sorted, so two
/// calls over the same inputs produce byte-identical reports regardless of
/// the order positions/broker rows arrived in.
pub fn reconcile(input: &ReconciliationInput) -> Report {
    let local_by_symbol: BTreeMap<&str, &Position> =
        input.local.iter().map(|p| (p.symbol.as_str(), p)).collect();
    let broker_by_symbol: BTreeMap<&str, &BrokerPosition> =
        input.broker.iter().map(|p| (p.symbol.as_str(), p)).collect();

    let local_symbols: BTreeSet<&str> = local_by_symbol.keys().copied().collect();
    let broker_symbols: BTreeSet<&str> = broker_by_symbol.keys().copied().collect();

    let extras_local: Vec<String> = local_symbols
        .difference(&broker_symbols)
        .map(|s| s.to_string())
        .collect();
    let extras_broker: Vec<String> = broker_symbols
        .difference(&local_symbols)
        .map(|s| s.to_string())
        .collect();

    let share_mismatches: Vec<ShareMismatch> = local_symbols
        .intersection(&broker_symbols)
        .filter_map(|symbol| {
            let local = local_by_symbol[symbol];
            let broker = broker_by_symbol[symbol];
            if local.shares != broker.shares {
                Some(ShareMismatch {
                    symbol: symbol.to_string(),
                    local_shares: local.shares,
                    broker_shares: broker.shares,
                })
            } else {
                None
            }
        })
        .collect();

    let (equity_delta, cash_delta) = match input.previous_broker_account {
        Some(previous) => (
            input.broker_account.equity - previous.equity,
            input.broker_account.cash - previous.cash,
        ),
        None => (0.0, 0.0),
    };

    Report {
        date_eastern: input.date_eastern,
        extras_local,
        extras_broker,
        share_mismatches,
        equity_delta,
        cash_delta,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoFixAction {
    /// A local position the broker no longer reports: close it with a
    /// synthetic `RECON_DROP` reason at the position's own last-known price
    /// (its cost basis is the only price this crate has without a gateway
    /// round-trip; the caller may substitute a fresher quote if it has one).
    CloseLocal { position_id: Uuid, symbol: String, last_known_price: f64 },
    /// A broker position with no local record: open a synthetic position at
    /// the broker's reported average cost.
    OpenFromBroker { symbol: String, shares: i64, avg_cost: f64 },
    /// A shared symbol whose share count disagrees: reconcile to the
    /// broker's count.
    AdjustSharesToBroker { position_id: Uuid, symbol: String, broker_shares: i64 },
}

/// Turns a [`Report`] into the concrete auto-fix actions, when `auto_fix`
/// is enabled. Returns nothing (not an empty
/// report-gated call) if `report.is_clean()` — callers are expected to check
/// `auto_fix` themselves before invoking this, since an advisory-only report
/// still gets persisted via `record_reconciliation` either way.
pub fn plan_auto_fix(report: &Report, input: &ReconciliationInput) -> Vec<AutoFixAction> {
    let local_by_symbol: BTreeMap<&str, &Position> =
        input.local.iter().map(|p| (p.symbol.as_str(), p)).collect();
    let broker_by_symbol: BTreeMap<&str, &BrokerPosition> =
        input.broker.iter().map(|p| (p.symbol.as_str(), p)).collect();

    let mut actions = Vec::new();

    for symbol in &report.extras_local {
        if let Some(position) = local_by_symbol.get(symbol.as_str()) {
            actions.push(AutoFixAction::CloseLocal {
                position_id: position.position_id,
                symbol: symbol.clone(),
                last_known_price: position.cost_price,
            });
        }
    }

    for symbol in &report.extras_broker {
        if let Some(broker_position) = broker_by_symbol.get(symbol.as_str()) {
            actions.push(AutoFixAction::OpenFromBroker {
                symbol: symbol.clone(),
                shares: broker_position.shares,
                avg_cost: broker_position.avg_cost,
            });
        }
    }

    for mismatch in &report.share_mismatches {
        if let Some(position) = local_by_symbol.get(mismatch.symbol.as_str()) {
            actions.push(AutoFixAction::AdjustSharesToBroker {
                position_id: position.position_id,
                symbol: mismatch.symbol.clone(),
                broker_shares: mismatch.broker_shares,
            });
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn position(symbol: &str, shares: i64, cost_price: f64) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            open_order_client_id: format!("buy-{symbol}"),
            symbol: symbol.to_string(),
            shares,
            cost_price,
            fees_paid: 1.0,
            open_time_eastern: Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap(),
            scheduled_exit_eastern: Utc.with_ymd_and_hms(2024, 6, 11, 19, 0, 0).unwrap(),
            high_water_price: cost_price,
            triggering_strike: None,
            meta: json!({}),
        }
    }

    fn broker_position(symbol: &str, shares: i64, avg_cost: f64) -> BrokerPosition {
        BrokerPosition { symbol: symbol.to_string(), shares, avg_cost }
    }

    fn account(equity: f64, cash: f64) -> Account {
        Account { equity, cash, buying_power: cash }
    }

    // S6. Local book shows AAA (100 sh); broker reports 0 sh AAA, 50 sh BBB.
    #[test]
    fn scenario_s6_reconciliation_detects_and_plans_auto_fix() {
        let input = ReconciliationInput {
            date_eastern: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            local: vec![position("AAA", 100, 50.0)],
            broker: vec![broker_position("BBB", 50, 20.0)],
            broker_account: account(100_000.0, 80_000.0),
            previous_broker_account: None,
        };

        let report = reconcile(&input);
        assert_eq!(report.extras_local, vec!["AAA".to_string()]);
        assert_eq!(report.extras_broker, vec!["BBB".to_string()]);
        assert!(report.share_mismatches.is_empty());

        let plan = plan_auto_fix(&report, &input);
        assert!(plan.contains(&AutoFixAction::CloseLocal {
            position_id: input.local[0].position_id,
            symbol: "AAA".to_string(),
            last_known_price: 50.0,
        }));
        assert!(plan.contains(&AutoFixAction::OpenFromBroker {
            symbol: "BBB".to_string(),
            shares: 50,
            avg_cost: 20.0,
        }));
    }

    #[test]
    fn matching_books_produce_a_clean_report() {
        let local = position("XYZ", 100, 50.0);
        let input = ReconciliationInput {
            date_eastern: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            local: vec![local],
            broker: vec![broker_position("XYZ", 100, 50.0)],
            broker_account: account(100_000.0, 80_000.0),
            previous_broker_account: Some(account(100_000.0, 80_000.0)),
        };
        let report = reconcile(&input);
        assert!(report.is_clean());
        assert_eq!(report.equity_delta, 0.0);
        assert_eq!(report.cash_delta, 0.0);
    }

    #[test]
    fn share_count_mismatch_is_reconciled_to_broker_count() {
        let local = position("XYZ", 100, 50.0);
        let position_id = local.position_id;
        let input = ReconciliationInput {
            date_eastern: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            local: vec![local],
            broker: vec![broker_position("XYZ", 80, 50.0)],
            broker_account: account(100_000.0, 80_000.0),
            previous_broker_account: None,
        };
        let report = reconcile(&input);
        assert_eq!(report.share_mismatches.len(), 1);
        assert_eq!(report.share_mismatches[0].broker_shares, 80);

        let plan = plan_auto_fix(&report, &input);
        assert_eq!(
            plan,
            vec![AutoFixAction::AdjustSharesToBroker {
                position_id,
                symbol: "XYZ".to_string(),
                broker_shares: 80,
            }]
        );
    }

    #[test]
    fn running_reconciliation_twice_with_no_activity_is_a_fixed_point() {
        // After an auto-fix round the local book is made to agree with the
        // broker; a second reconcile over the now-matching books must be clean.
        let input = ReconciliationInput {
            date_eastern: NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(),
            local: vec![position("XYZ", 80, 50.0)],
            broker: vec![broker_position("XYZ", 80, 50.0)],
            broker_account: account(100_000.0, 80_000.0),
            previous_broker_account: Some(account(100_000.0, 80_000.0)),
        };
        assert!(reconcile(&input).is_clean());
    }
}
