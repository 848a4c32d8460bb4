//! Error taxonomy for [`crate::MarketGateway`] calls.

use std::fmt;

/// Everything a `MarketGateway` call can fail with. Both the live and
/// simulated implementations map their own transport/broker errors into
/// these variants so callers (strategy, position monitor, reconciliation)
/// never see adapter-specific error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// `get_quote`/`get_minute_bars` on a symbol the venue has no data for.
    SymbolUnknown { symbol: String },
    /// The most recent quote/bar is older than the caller's freshness bound.
    Stale { symbol: String },
    /// Transport-level failure: connection refused, DNS, TLS, timeout.
    Network { detail: String },
    /// `place_order` was retried with the same `client_id` but different
    /// order parameters than the original submission.
    IdempotencyConflict { client_id: String },
    /// `place_order` would violate the minimum cash ratio.
    InsufficientFunds { client_id: String },
    /// `get_order` on a `client_id` the venue has never seen.
    NotFound { client_id: String },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::SymbolUnknown { symbol } => write!(f, "symbol unknown: {symbol}"),
            GatewayError::Stale { symbol } => write!(f, "stale market data for {symbol}"),
            GatewayError::Network { detail } => write!(f, "gateway network error: {detail}"),
            GatewayError::IdempotencyConflict { client_id } => {
                write!(f, "order {client_id} resubmitted with different parameters")
            }
            GatewayError::InsufficientFunds { client_id } => {
                write!(f, "order {client_id} rejected: insufficient funds")
            }
            GatewayError::NotFound { client_id } => write!(f, "no order found for {client_id}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Retryable transient errors are the ones a caller's timeout/backoff loop
/// should retry; `IdempotencyConflict` and `NotFound` are not,
/// since retrying them can never change the outcome.
impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Network { .. } | GatewayError::Stale { .. })
    }
}
