use crate::types::{RiskCheckInput, RiskCheckResult, RiskLimits};

/// Simulates the post-trade state of a candidate entry against the three
/// configured limits: gross-notional-to-equity ratio,
/// leverage, and cash ratio. Pure arithmetic — callers own gathering
/// `equity`/`cash`/`gross_exposure`/`daily_gross_ratio_used` from persistence.
pub fn evaluate(limits: &RiskLimits, input: &RiskCheckInput) -> RiskCheckResult {
    input.evaluate(limits)
}

/// The decrement `scale_down_to_fit` shrinks a rejected order by on each
/// retry, as a fraction of the original share count. The original share
/// count is always tried first.
const SCALE_DOWN_STEP: f64 = 0.1;

/// Reduces `input.shares` in fixed steps until [`evaluate`] passes or the
/// size falls below `min_shares` (`scale_down_to_fit`).
/// Returns the largest passing share count, or `None` if every size down to
/// `min_shares` still fails.
pub fn scale_down_to_fit(
    limits: &RiskLimits,
    input: &RiskCheckInput,
    min_shares: i64,
) -> Option<i64> {
    if input.shares < min_shares {
        return None;
    }
    let step = ((input.shares as f64) * SCALE_DOWN_STEP).ceil().max(1.0) as i64;
    let mut shares = input.shares;
    loop {
        let probe = input.with_shares(shares);
        if probe.evaluate(limits).passes {
            return Some(shares);
        }
        shares -= step;
        if shares < min_shares {
            return None;
        }
    }
}
