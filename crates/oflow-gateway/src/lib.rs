//! oflow-gateway
//!
//! The market-gateway abstraction: a single async interface
//! for quotes, minute bars, account state, and order placement that the live
//! and simulated brokers both implement identically. Strategy, the position
//! monitor, and reconciliation depend only on `MarketGateway` — never on
//! `oflow-broker-live` or `oflow-broker-sim` directly.

mod error;
mod market_gateway;
mod types;

pub use error::GatewayError;
pub use market_gateway::MarketGateway;
pub use types::{Account, BrokerPosition, MinuteBar, OrderResult, OrderStatus, Quote, Side};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_conflict_is_not_retryable() {
        let err = GatewayError::IdempotencyConflict {
            client_id: "c-1".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("c-1"));
    }

    #[test]
    fn network_errors_are_retryable() {
        let err = GatewayError::Network {
            detail: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = GatewayError::NotFound {
            client_id: "c-2".to_string(),
        };
        assert!(!err.is_retryable());
    }
}
