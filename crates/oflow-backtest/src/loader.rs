//! CSV loading for the raw signal feed a backtest run replays (the same wire
//! shape the live file watcher hands to `oflow-strategy::signal_from_raw`).

use std::path::Path;

use oflow_schemas::RawSignalRecord;

use crate::types::BacktestError;

/// Reads a CSV of [`RawSignalRecord`] rows (header row required, column
/// names matching the struct's field names).
pub fn load_raw_signals_csv(path: &Path) -> Result<Vec<RawSignalRecord>, BacktestError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| BacktestError::BadSignalRow {
        line: 0,
        detail: format!("open {}: {e}", path.display()),
    })?;

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<RawSignalRecord>().enumerate() {
        let record = result.map_err(|e| BacktestError::BadSignalRow {
            line: line + 1,
            detail: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}
