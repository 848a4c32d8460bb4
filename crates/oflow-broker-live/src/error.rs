//! Maps transport/HTTP failures talking to the brokerage daemon into
//! [`oflow_gateway::GatewayError`].

use oflow_gateway::GatewayError;

pub(crate) fn from_reqwest(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Network {
            detail: "request timed out".to_string(),
        }
    } else {
        GatewayError::Network { detail: e.to_string() }
    }
}
