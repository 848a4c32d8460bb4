//! Deterministic fingerprints for `signal_id` and `client_id`.
//!
//! Both are SHA-256 over a canonical pipe-joined tuple of their inputs,
//! hex-encoded and truncated to a stable 32-hex-character id. Truncating to
//! 128 bits keeps ids short enough to sit comfortably in a `text primary
//! key` column while leaving collision probability astronomically small for
//! this system's event volume.

use sha2::{Digest, Sha256};

const ID_HEX_LEN: usize = 32;

fn digest_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    let full = hex::encode(hasher.finalize());
    full[..ID_HEX_LEN].to_string()
}

/// `signal_id = fingerprint(symbol, signal_time_eastern, premium_usd, ask, contract_id)`.
/// `premium_usd`/`ask` are rendered as fixed-point micros so float noise
/// upstream of ingestion can't change the fingerprint.
pub fn signal_id(
    symbol: &str,
    signal_time_eastern_rfc3339: &str,
    premium_usd_micros: i64,
    ask_micros: Option<i64>,
    contract_id: Option<&str>,
) -> String {
    let premium = premium_usd_micros.to_string();
    let ask = ask_micros.map(|a| a.to_string()).unwrap_or_else(|| "NA".to_string());
    digest_hex(&[
        symbol,
        signal_time_eastern_rfc3339,
        &premium,
        &ask,
        contract_id.unwrap_or("NA"),
    ])
}

/// `client_id = fingerprint(triggering_event_id, side, exec_time_eastern)`.
/// `triggering_event_id` is the opening `signal_id` for a BUY and the
/// `position_id` for a SELL.
pub fn client_id(triggering_event_id: &str, side: &str, exec_time_eastern_rfc3339: &str) -> String {
    digest_hex(&[triggering_event_id, side, exec_time_eastern_rfc3339])
}
