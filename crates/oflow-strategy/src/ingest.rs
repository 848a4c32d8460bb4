//! Converts the external watcher's [`RawSignalRecord`] into the engine's
//! immutable [`Signal`]: one timezone conversion at
//! ingestion, plus the `signal_id` fingerprint, computed once and never
//! recomputed downstream.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use oflow_db::{to_micros, Signal};
use oflow_schemas::{RawOptionType, RawSignalRecord};

/// Parses `raw.date` + `raw.time` as a wall-clock instant in `source_tz`,
/// converts it to UTC (stored as `signal_time_source`) and to Eastern
/// (stored as `signal_time_eastern`), and computes the `signal_id`
/// fingerprint over the canonical tuple.
///
/// `source_tz` is the producer's zone (configured per feed); most US
/// options-flow feeds already report in Eastern time, so `America/New_York`
/// is the common case but never hardcoded here.
pub fn signal_from_raw(raw: &RawSignalRecord, source_tz: Tz) -> Result<Signal> {
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {}", raw.date, raw.time),
        "%Y-%m-%d %H:%M:%S",
    )
    .with_context(|| format!("parse signal date/time: {} {}", raw.date, raw.time))?;

    let source_local = source_tz
        .from_local_datetime(&naive)
        .single()
        .with_context(|| format!("ambiguous/invalid local time {naive} in {source_tz}"))?;
    let signal_time_source = source_local.with_timezone(&chrono::Utc);
    let signal_time_eastern = oflow_calendar::to_eastern(signal_time_source).with_timezone(&chrono::Utc);

    let premium_usd = raw.premium;
    // The raw record carries `ask` only implicitly via `side`/`premium` in
    // some feeds; this engine treats `premium` itself as the economically
    // meaningful figure and has no separate ask field on the wire shape, so
    // the fingerprint's `ask` slot is left unset (symmetric with
    // `Signal::ask` being `Option`).
    let ask: Option<f64> = None;
    let contract_id = Some(raw.contract.clone());

    let signal_id = crate::fingerprint::signal_id(
        &raw.underlying_symbol,
        &signal_time_eastern.to_rfc3339(),
        to_micros(premium_usd),
        ask.map(to_micros),
        contract_id.as_deref(),
    );

    let option_type = Some(
        match raw.option_type {
            RawOptionType::Call => "call",
            RawOptionType::Put => "put",
        }
        .to_string(),
    );

    Ok(Signal {
        signal_id,
        symbol: raw.underlying_symbol.clone(),
        premium_usd,
        ask,
        contract_id,
        option_type,
        strike_price: Some(raw.strike_price),
        stock_price: Some(raw.stock_price),
        signal_time_source,
        signal_time_eastern,
        source_file: raw.source_file.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use oflow_schemas::{RawOptionSide, RawOptionType};

    fn sample_raw() -> RawSignalRecord {
        RawSignalRecord {
            date: "2024-06-03".to_string(),
            time: "15:35:00".to_string(),
            underlying_symbol: "XYZ".to_string(),
            side: RawOptionSide::Ask,
            contract: "XYZ240621C00150000".to_string(),
            strike_price: 150.0,
            option_type: RawOptionType::Call,
            expiry_date: "2024-06-21".to_string(),
            dte: 18,
            stock_price: 148.5,
            premium: 150_000.0,
            size: 100,
            volume: 5000,
            oi: 1200,
            source_file: "flow_20240603.csv".to_string(),
        }
    }

    #[test]
    fn same_raw_record_yields_same_signal_id() {
        let a = signal_from_raw(&sample_raw(), New_York).unwrap();
        let b = signal_from_raw(&sample_raw(), New_York).unwrap();
        assert_eq!(a.signal_id, b.signal_id);
    }

    #[test]
    fn differing_premium_yields_differing_signal_id() {
        let a = signal_from_raw(&sample_raw(), New_York).unwrap();
        let mut raw2 = sample_raw();
        raw2.premium = 90_000.0;
        let b = signal_from_raw(&raw2, New_York).unwrap();
        assert_ne!(a.signal_id, b.signal_id);
    }

    #[test]
    fn signal_time_eastern_matches_source_when_source_is_eastern() {
        let signal = signal_from_raw(&sample_raw(), New_York).unwrap();
        assert_eq!(signal.signal_time_source, signal.signal_time_eastern);
    }
}
