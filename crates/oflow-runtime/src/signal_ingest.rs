//! The engine side of signal ingestion: turn a validated
//! [`RawSignalRecord`] — produced by the file watcher/parser this engine
//! treats as an external collaborator — into a [`Signal`], deduplicate it
//! against persistence, and hand it to the signal buffer. Parsing the
//! watched directory itself is out of scope here; this module picks up
//! exactly where that producer's contract ends.

use anyhow::Result;
use chrono_tz::Tz;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, info};

use oflow_db::Signal;
use oflow_schemas::RawSignalRecord;
use oflow_strategy::signal_from_raw;

/// Converts `raw` to a `Signal`, inserts it if its `signal_id` hasn't been
/// seen before, and — only on first insert — sends it to `tx` for the
/// signal worker to pick up. A duplicate is logged and otherwise ignored
/// without error.
pub async fn ingest_raw_signal(
    pool: &PgPool,
    tx: &mpsc::Sender<Signal>,
    raw: &RawSignalRecord,
    source_tz: Tz,
) -> Result<()> {
    let signal = signal_from_raw(raw, source_tz)?;

    let inserted = oflow_db::insert_signal_if_new(pool, &signal).await?;
    if !inserted {
        debug!(signal_id = %signal.signal_id, symbol = %signal.symbol, "duplicate signal ignored");
        return Ok(());
    }

    info!(signal_id = %signal.signal_id, symbol = %signal.symbol, premium_usd = signal.premium_usd, "signal accepted");

    if tx.send(signal).await.is_err() {
        // The signal worker has shut down; the row is already durably
        // persisted, so there is nothing further to do here.
        debug!("signal buffer closed; dropping accepted signal from delivery");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use oflow_schemas::{RawOptionSide, RawOptionType};

    fn raw() -> RawSignalRecord {
        RawSignalRecord {
            date: "2024-06-03".into(),
            time: "15:35:00".into(),
            underlying_symbol: "XYZ".into(),
            side: RawOptionSide::Ask,
            contract: "XYZ240621C00150000".into(),
            strike_price: 150.0,
            option_type: RawOptionType::Call,
            expiry_date: "2024-06-21".into(),
            dte: 18,
            stock_price: 148.0,
            premium: 150_000.0,
            size: 100,
            volume: 500,
            oi: 1200,
            source_file: "flow_2024-06-03.csv".into(),
        }
    }

    #[test]
    fn raw_record_converts_to_a_well_formed_signal() {
        let signal = signal_from_raw(&raw(), New_York).unwrap();
        assert_eq!(signal.symbol, "XYZ");
        assert_eq!(signal.premium_usd, 150_000.0);
    }
}
