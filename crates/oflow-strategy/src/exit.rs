//! `on_position_check`: walks the minute bars since the
//! position's last check in timestamp order, tracking the high-water mark
//! and testing the strict exit-priority ladder on each bar. The first bar
//! to trigger any condition wins; later bars in the same window are never
//! examined once a decision is produced.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use oflow_config::ExitsSection;
use oflow_db::Position;
use oflow_schemas::MinuteBar;

use crate::fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Timed,
    Strike,
    TakeProfit,
    TrailingStop,
    StopLoss,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Timed => "TIMED",
            ExitReason::Strike => "STRIKE",
            ExitReason::TakeProfit => "TP",
            ExitReason::TrailingStop => "TRAIL",
            ExitReason::StopLoss => "SL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub position_id: Uuid,
    pub reason: ExitReason,
    pub exit_price: f64,
    pub bar_timestamp: DateTime<Utc>,
    pub client_id: String,
}

/// The result of one `on_position_check` call: the high-water mark after
/// folding in every bar walked, plus an exit decision if the ladder fired.
/// The monitor persists `new_high_water_price` via `update_high_water_price`
/// regardless of whether a decision was produced.
#[derive(Debug, Clone)]
pub struct PositionCheckOutcome {
    pub new_high_water_price: f64,
    pub decision: Option<ExitDecision>,
}

pub fn on_position_check(
    position: &Position,
    bars: &[MinuteBar],
    exits: &ExitsSection,
) -> PositionCheckOutcome {
    let mut high_water_price = position.high_water_price;

    for bar in bars {
        high_water_price = high_water_price.max(bar.high);

        let reason_and_price = if bar.timestamp_utc >= position.scheduled_exit_eastern {
            Some((ExitReason::Timed, bar.close))
        } else if let Some(strike) = position.triggering_strike {
            if bar.low <= strike && strike <= bar.high {
                Some((ExitReason::Strike, strike))
            } else {
                exit_threshold(position, exits, bar, high_water_price)
            }
        } else {
            exit_threshold(position, exits, bar, high_water_price)
        };

        if let Some((reason, exit_price)) = reason_and_price {
            let client_id = fingerprint::client_id(
                &position.position_id.to_string(),
                "SELL",
                &bar.timestamp_utc.to_rfc3339(),
            );
            return PositionCheckOutcome {
                new_high_water_price: high_water_price,
                decision: Some(ExitDecision {
                    position_id: position.position_id,
                    reason,
                    exit_price,
                    bar_timestamp: bar.timestamp_utc,
                    client_id,
                }),
            };
        }
    }

    PositionCheckOutcome {
        new_high_water_price: high_water_price,
        decision: None,
    }
}

/// Priority 3 (take profit) through 5 (stop loss) — the three threshold
/// exits that don't depend on the scheduled time or a stored strike.
fn exit_threshold(
    position: &Position,
    exits: &ExitsSection,
    bar: &MinuteBar,
    high_water_price: f64,
) -> Option<(ExitReason, f64)> {
    let take_profit_price = position.cost_price * (1.0 + exits.take_profit);
    if bar.high >= take_profit_price {
        return Some((ExitReason::TakeProfit, take_profit_price));
    }

    let trailing_stop_price = high_water_price * (1.0 - exits.trailing_stop);
    if high_water_price > position.cost_price && bar.low <= trailing_stop_price {
        return Some((ExitReason::TrailingStop, trailing_stop_price));
    }

    let stop_loss_price = position.cost_price * (1.0 - exits.stop_loss);
    if bar.low <= stop_loss_price {
        return Some((ExitReason::StopLoss, stop_loss_price));
    }

    None
}
