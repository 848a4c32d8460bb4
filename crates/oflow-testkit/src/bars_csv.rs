//! Loads a `MinuteBar` sequence from a simple CSV fixture
//! (`ts_close_utc,open,high,low,close`), for tests that exercise
//! `on_position_check`/`resolve_exec_price` without a database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use oflow_schemas::MinuteBar;

pub fn load_bars_csv(path: &str) -> Result<Vec<MinuteBar>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open bars csv: {path}"))?;
    let mut out = Vec::new();

    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("read bar row in {path}"))?;
        let timestamp_utc: DateTime<Utc> = rec[0].parse().context("parse ts_close_utc")?;
        out.push(MinuteBar {
            timestamp_utc,
            open: rec[1].parse().context("parse open")?,
            high: rec[2].parse().context("parse high")?,
            low: rec[3].parse().context("parse low")?,
            close: rec[4].parse().context("parse close")?,
        });
    }

    for w in out.windows(2) {
        if w[0].timestamp_utc >= w[1].timestamp_utc {
            anyhow::bail!("bars not strictly increasing in {path}");
        }
    }

    Ok(out)
}
