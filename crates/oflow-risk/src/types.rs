//! Inputs and outputs for the pre-trade risk simulation.

/// The three thresholds a candidate entry is checked against. Sourced from
/// `oflow-config::RiskSection` by the caller; kept as a standalone struct
/// here so this crate stays dependency-free and purely arithmetic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskLimits {
    /// Fraction of equity the day's cumulative gross notional may not exceed.
    pub daily_gross_cap: f64,
    /// Max allowed `gross_exposure / equity` after the trade.
    pub max_leverage: f64,
    /// Min allowed `cash / equity` after the trade (negative values permitted).
    pub min_cash_ratio: f64,
}

/// Account/position state a candidate entry is simulated against, plus the
/// trade itself. All dollar fields are in plain USD (not fixed-point); this
/// crate performs no persistence and no money accounting of its own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskCheckInput {
    pub equity: f64,
    pub cash: f64,
    /// Gross notional of currently open positions (sum of |shares * price|).
    pub gross_exposure: f64,
    /// Today's cumulative gross notional already traded, expressed as a
    /// ratio of equity — matches `oflow-db::DailyUsed::gross_ratio_micros`,
    /// which this crate's caller reads from persistence and converts via
    /// `from_micros`.
    pub daily_gross_ratio_used: f64,
    pub shares: i64,
    pub limit_price: f64,
}

impl RiskCheckInput {
    fn trade_notional(&self) -> f64 {
        self.shares as f64 * self.limit_price
    }

    pub(crate) fn with_shares(&self, shares: i64) -> Self {
        Self { shares, ..*self }
    }
}

/// Post-trade ratios computed by [`crate::evaluate`], and which of the three
/// checks (if any) failed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskCheckResult {
    pub gross_ratio_after: f64,
    pub gross_leverage_after: f64,
    pub cash_ratio_after: f64,
    pub passes: bool,
}

impl RiskCheckInput {
    pub(crate) fn evaluate(&self, limits: &RiskLimits) -> RiskCheckResult {
        let notional = self.trade_notional();
        let gross_ratio_after = self.daily_gross_ratio_used + notional / self.equity;
        let gross_exposure_after = self.gross_exposure + notional;
        let gross_leverage_after = gross_exposure_after / self.equity;
        let cash_after = self.cash - notional;
        let cash_ratio_after = cash_after / self.equity;

        let passes = gross_ratio_after <= limits.daily_gross_cap
            && gross_leverage_after <= limits.max_leverage
            && cash_ratio_after >= limits.min_cash_ratio;

        RiskCheckResult {
            gross_ratio_after,
            gross_leverage_after,
            cash_ratio_after,
            passes,
        }
    }
}
