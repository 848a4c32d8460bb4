//! Persistence for the signal-to-position pipeline. Every mutating operation here either
//! runs as a single statement with an atomic `RETURNING` clause or wraps a
//! short `SERIALIZABLE`-equivalent transaction around a row lock — the
//! `reserve_daily_capacity` admission check is the canonical example of the
//! latter, using the same row-level-lock pattern as a claim-style outbox
//! query (`FOR UPDATE` inside one transaction rather than separate
//! read-then-write statements).
//!
//! All `DateTime<Utc>` fields whose name ends in `_eastern` hold the UTC
//! instant that corresponds to an Eastern-wall-clock computation performed
//! by `oflow-calendar` upstream — Postgres `timestamptz` is timezone-naive
//! storage; there is nothing to gain from serializing a `DateTime<Tz>`
//! through the wire, and every call site already has a `Tz`-aware display
//! path when it needs to render Eastern time.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Convert a dollar amount to fixed-point micros (1 USD = 1_000_000), with
/// round-to-nearest rather than truncation — incoming signal premiums and
/// limit prices are already quantized to cents by upstream producers, so
/// rounding here is a no-op in practice and only guards against float noise.
pub fn to_micros(dollars: f64) -> i64 {
    (dollars * 1_000_000.0).round() as i64
}

pub fn from_micros(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Signal {
    pub signal_id: String,
    pub symbol: String,
    pub premium_usd: f64,
    pub ask: Option<f64>,
    pub contract_id: Option<String>,
    pub option_type: Option<String>,
    pub strike_price: Option<f64>,
    pub stock_price: Option<f64>,
    pub signal_time_source: DateTime<Utc>,
    pub signal_time_eastern: DateTime<Utc>,
    pub source_file: String,
}

/// Atomic on `signal_id`: a repeat insert is a no-op and returns `false`,
/// never an error.
pub async fn insert_signal_if_new(pool: &PgPool, signal: &Signal) -> Result<bool> {
    let rec = sqlx::query(
        r#"
        insert into signals (
            signal_id, symbol, premium_usd_micros, ask_micros, contract_id,
            signal_time_source, signal_time_eastern, option_type,
            strike_price_micros, stock_price_micros, source_file
        ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
        on conflict (signal_id) do nothing
        returning signal_id
        "#,
    )
    .bind(&signal.signal_id)
    .bind(&signal.symbol)
    .bind(to_micros(signal.premium_usd))
    .bind(signal.ask.map(to_micros))
    .bind(&signal.contract_id)
    .bind(signal.signal_time_source)
    .bind(signal.signal_time_eastern)
    .bind(&signal.option_type)
    .bind(signal.strike_price.map(to_micros))
    .bind(signal.stock_price.map(to_micros))
    .bind(&signal.source_file)
    .fetch_optional(pool)
    .await
    .context("insert_signal_if_new failed")?;

    Ok(rec.is_some())
}

/// Mean `premium_usd` for `symbol` over the `lookback_days` trading days
/// before `now`, or `None` if no signal is on record for that symbol yet in
/// the window (the historical filter in `oflow-strategy` fails open on `None`).
pub async fn historical_mean_premium(
    pool: &PgPool,
    symbol: &str,
    now: DateTime<Utc>,
    lookback_days: u32,
) -> Result<Option<f64>> {
    let since = now - chrono::Duration::days(lookback_days as i64);
    let mean_micros: Option<f64> = sqlx::query_scalar(
        r#"
        select avg(premium_usd_micros)::float8
        from signals
        where symbol = $1 and signal_time_eastern >= $2 and signal_time_eastern < $3
        "#,
    )
    .bind(symbol)
    .bind(since)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("historical_mean_premium failed")?;

    Ok(mean_micros.map(|m| m / 1_000_000.0))
}

// ---------------------------------------------------------------------------
// Blacklist
// ---------------------------------------------------------------------------

/// `None` if the symbol has no blacklist row, or its window has already
/// expired relative to `now` — expired rows are ignored, not garbage
/// collected.
pub async fn blacklist_until(
    pool: &PgPool,
    symbol: &str,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let row = sqlx::query("select valid_until_eastern from blacklist where symbol = $1")
        .bind(symbol)
        .fetch_optional(pool)
        .await
        .context("blacklist_until failed")?;

    Ok(row.and_then(|r| {
        let until: DateTime<Utc> = r.get("valid_until_eastern");
        if until > now {
            Some(until)
        } else {
            None
        }
    }))
}

async fn upsert_blacklist(
    ex: impl sqlx::PgExecutor<'_>,
    symbol: &str,
    valid_until_eastern: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into blacklist (symbol, valid_until_eastern)
        values ($1, $2)
        on conflict (symbol) do update set valid_until_eastern = excluded.valid_until_eastern
        "#,
    )
    .bind(symbol)
    .bind(valid_until_eastern)
    .execute(ex)
    .await
    .context("upsert_blacklist failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Daily state / reservations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyUsed {
    pub trade_count: i32,
    pub gross_ratio_micros: i64,
}

/// Sums committed + currently-held reservations for `date`.
pub async fn daily_used(pool: &PgPool, date: NaiveDate) -> Result<DailyUsed> {
    let trade_count: i32 = sqlx::query_scalar(
        "select coalesce(trade_count, 0) from daily_state where date_eastern = $1",
    )
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("daily_used: load trade_count failed")?
    .unwrap_or(0);

    let committed: i64 = sqlx::query_scalar(
        "select coalesce(committed_gross_ratio_micros, 0) from daily_state where date_eastern = $1",
    )
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("daily_used: load committed ratio failed")?
    .unwrap_or(0);

    let held: i64 = sqlx::query_scalar(
        "select coalesce(sum(ratio_micros), 0) from daily_reservations where date_eastern = $1 and status = 'HELD'",
    )
    .bind(date)
    .fetch_one(pool)
    .await
    .context("daily_used: sum held reservations failed")?;

    Ok(DailyUsed {
        trade_count,
        gross_ratio_micros: committed + held,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    Held(Uuid),
    Rejected,
}

/// Atomically checks admission caps against current used-plus-reserved and
/// either inserts a `HELD` reservation or fails — the one true row-lock
/// critical section in this module.
pub async fn reserve_daily_capacity(
    pool: &PgPool,
    date: NaiveDate,
    ratio_micros: i64,
    daily_gross_cap_micros: i64,
    max_trades_per_day: i32,
) -> Result<ReservationOutcome> {
    let mut tx = pool.begin().await.context("reserve_daily_capacity: begin tx")?;

    sqlx::query(
        r#"
        insert into daily_state (date_eastern, trade_count, committed_gross_ratio_micros)
        values ($1, 0, 0)
        on conflict (date_eastern) do nothing
        "#,
    )
    .bind(date)
    .execute(&mut *tx)
    .await
    .context("reserve_daily_capacity: ensure daily_state row")?;

    let row = sqlx::query(
        "select trade_count, committed_gross_ratio_micros from daily_state where date_eastern = $1 for update",
    )
    .bind(date)
    .fetch_one(&mut *tx)
    .await
    .context("reserve_daily_capacity: lock daily_state row")?;
    let trade_count: i32 = row.get("trade_count");
    let committed: i64 = row.get("committed_gross_ratio_micros");

    let (held_count, held_ratio): (i64, i64) = sqlx::query_as(
        r#"
        select count(*)::bigint, coalesce(sum(ratio_micros), 0)
        from daily_reservations
        where date_eastern = $1 and status = 'HELD'
        "#,
    )
    .bind(date)
    .fetch_one(&mut *tx)
    .await
    .context("reserve_daily_capacity: sum held reservations")?;

    let gross_after = committed + held_ratio + ratio_micros;
    let trade_count_after = trade_count as i64 + held_count + 1;

    if gross_after > daily_gross_cap_micros || trade_count_after > max_trades_per_day as i64 {
        tx.commit().await.context("reserve_daily_capacity: commit rejection")?;
        return Ok(ReservationOutcome::Rejected);
    }

    let reservation_id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into daily_reservations (reservation_id, date_eastern, ratio_micros, status)
        values ($1, $2, $3, 'HELD')
        "#,
    )
    .bind(reservation_id)
    .bind(date)
    .bind(ratio_micros)
    .execute(&mut *tx)
    .await
    .context("reserve_daily_capacity: insert reservation")?;

    tx.commit().await.context("reserve_daily_capacity: commit")?;
    Ok(ReservationOutcome::Held(reservation_id))
}

/// Moves a `HELD` reservation's ratio into the day's committed total and
/// increments `trade_count`. Only valid for a reservation created by this
/// trading day's `reserve_daily_capacity` call and still `HELD`.
pub async fn commit_daily_capacity(pool: &PgPool, reservation_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("commit_daily_capacity: begin tx")?;

    let row = sqlx::query(
        "select date_eastern, ratio_micros, status from daily_reservations where reservation_id = $1 for update",
    )
    .bind(reservation_id)
    .fetch_optional(&mut *tx)
    .await
    .context("commit_daily_capacity: lock reservation")?
    .context("commit_daily_capacity: unknown reservation_id")?;

    let status: String = row.get("status");
    anyhow::ensure!(
        status == "HELD",
        "commit_daily_capacity: reservation {reservation_id} is not HELD (status={status})"
    );
    let date: NaiveDate = row.get("date_eastern");
    let ratio: i64 = row.get("ratio_micros");

    sqlx::query("update daily_reservations set status = 'COMMITTED' where reservation_id = $1")
        .bind(reservation_id)
        .execute(&mut *tx)
        .await
        .context("commit_daily_capacity: mark committed")?;

    sqlx::query(
        r#"
        update daily_state
        set trade_count = trade_count + 1,
            committed_gross_ratio_micros = committed_gross_ratio_micros + $2
        where date_eastern = $1
        "#,
    )
    .bind(date)
    .bind(ratio)
    .execute(&mut *tx)
    .await
    .context("commit_daily_capacity: update daily_state")?;

    tx.commit().await.context("commit_daily_capacity: commit")?;
    Ok(())
}

/// Frees a `HELD` reservation's ratio without touching `trade_count` (a
/// rolled-back reservation never counted as a completed trade).
pub async fn rollback_daily_capacity(pool: &PgPool, reservation_id: Uuid) -> Result<()> {
    sqlx::query(
        "update daily_reservations set status = 'ROLLED_BACK' where reservation_id = $1 and status = 'HELD'",
    )
    .bind(reservation_id)
    .execute(pool)
    .await
    .context("rollback_daily_capacity failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => anyhow::bail!("invalid order side: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Partial,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled)
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "PENDING" => OrderStatus::Pending,
            "PARTIAL" => OrderStatus::Partial,
            "FILLED" => OrderStatus::Filled,
            "REJECTED" => OrderStatus::Rejected,
            "CANCELLED" => OrderStatus::Cancelled,
            other => anyhow::bail!("invalid order status: {other}"),
        })
    }
}

/// A gateway order-state transition, recorded verbatim as an append-only
/// event and projected into the `orders` table's current-state row.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub shares: i64,
    pub limit_price: f64,
    pub status: OrderStatus,
    pub filled_shares: i64,
    pub avg_price: Option<f64>,
    pub broker_id: Option<String>,
    pub reject_reason: Option<String>,
    pub created_eastern: DateTime<Utc>,
    pub updated_eastern: DateTime<Utc>,
}

/// What a `MarketGateway::place_order`/`get_order` call returns: the current
/// state of an order as the venue (real or simulated) sees it. Shares the
/// same field set as [`OrderEvent`] minus the bookkeeping timestamps, which
/// the caller supplies when it turns a result into a persisted event.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub shares: i64,
    pub limit_price: f64,
    pub status: OrderStatus,
    pub filled_shares: i64,
    pub avg_price: Option<f64>,
    pub broker_id: Option<String>,
    pub reject_reason: Option<String>,
}

impl OrderResult {
    /// Builds the append-only event this result implies, stamping both
    /// timestamps with `now` — callers that already have the order's
    /// original `created_eastern` should construct an [`OrderEvent`]
    /// directly instead.
    pub fn into_event(self, now: DateTime<Utc>) -> OrderEvent {
        OrderEvent {
            client_id: self.client_id,
            symbol: self.symbol,
            side: self.side,
            shares: self.shares,
            limit_price: self.limit_price,
            status: self.status,
            filled_shares: self.filled_shares,
            avg_price: self.avg_price,
            broker_id: self.broker_id,
            reject_reason: self.reject_reason,
            created_eastern: now,
            updated_eastern: now,
        }
    }
}

pub async fn record_order_event(pool: &PgPool, event: &OrderEvent) -> Result<()> {
    let mut tx = pool.begin().await.context("record_order_event: begin tx")?;

    sqlx::query(
        r#"
        insert into order_events (
            client_id, symbol, side, shares, limit_price_micros, status,
            filled_shares, avg_price_micros, broker_id, reject_reason
        ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        "#,
    )
    .bind(&event.client_id)
    .bind(&event.symbol)
    .bind(event.side.as_str())
    .bind(event.shares)
    .bind(to_micros(event.limit_price))
    .bind(event.status.as_str())
    .bind(event.filled_shares)
    .bind(event.avg_price.map(to_micros))
    .bind(&event.broker_id)
    .bind(&event.reject_reason)
    .execute(&mut *tx)
    .await
    .context("record_order_event: insert event")?;

    sqlx::query(
        r#"
        insert into orders (
            client_id, symbol, side, shares, limit_price_micros, status,
            filled_shares, avg_price_micros, broker_id, reject_reason,
            created_eastern, updated_eastern
        ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        on conflict (client_id) do update set
            status = excluded.status,
            filled_shares = excluded.filled_shares,
            avg_price_micros = excluded.avg_price_micros,
            broker_id = excluded.broker_id,
            reject_reason = excluded.reject_reason,
            updated_eastern = excluded.updated_eastern
        "#,
    )
    .bind(&event.client_id)
    .bind(&event.symbol)
    .bind(event.side.as_str())
    .bind(event.shares)
    .bind(to_micros(event.limit_price))
    .bind(event.status.as_str())
    .bind(event.filled_shares)
    .bind(event.avg_price.map(to_micros))
    .bind(&event.broker_id)
    .bind(&event.reject_reason)
    .bind(event.created_eastern)
    .bind(event.updated_eastern)
    .execute(&mut *tx)
    .await
    .context("record_order_event: upsert orders projection")?;

    tx.commit().await.context("record_order_event: commit")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Position {
    pub position_id: Uuid,
    pub open_order_client_id: String,
    pub symbol: String,
    pub shares: i64,
    pub cost_price: f64,
    pub fees_paid: f64,
    pub open_time_eastern: DateTime<Utc>,
    pub scheduled_exit_eastern: DateTime<Utc>,
    pub high_water_price: f64,
    pub triggering_strike: Option<f64>,
    pub meta: Value,
}

pub struct NewPosition {
    pub open_order_client_id: String,
    pub symbol: String,
    pub shares: i64,
    pub cost_price: f64,
    pub fees_paid: f64,
    pub open_time_eastern: DateTime<Utc>,
    pub scheduled_exit_eastern: DateTime<Utc>,
    pub triggering_strike: Option<f64>,
    pub meta: Value,
    /// Blacklist window computed at open time.
    pub blacklist_valid_until_eastern: DateTime<Utc>,
}

/// Opens a position and blacklists the symbol in one transaction. The
/// triggering order's `FILLED` event must already have been recorded via
/// [`record_order_event`] (the `open_order_client_id` foreign key depends
/// on it).
pub async fn record_open(pool: &PgPool, new_pos: &NewPosition) -> Result<Uuid> {
    let mut tx = pool.begin().await.context("record_open: begin tx")?;
    let position_id = Uuid::new_v4();

    sqlx::query(
        r#"
        insert into positions (
            position_id, open_order_client_id, symbol, shares, cost_price_micros,
            fees_paid_micros, open_time_eastern, scheduled_exit_eastern,
            high_water_price_micros, triggering_strike_micros, meta, status
        ) values ($1,$2,$3,$4,$5,$6,$7,$8,$5,$9,$10,'OPEN')
        "#,
    )
    .bind(position_id)
    .bind(&new_pos.open_order_client_id)
    .bind(&new_pos.symbol)
    .bind(new_pos.shares)
    .bind(to_micros(new_pos.cost_price))
    .bind(to_micros(new_pos.fees_paid))
    .bind(new_pos.open_time_eastern)
    .bind(new_pos.scheduled_exit_eastern)
    .bind(new_pos.triggering_strike.map(to_micros))
    .bind(&new_pos.meta)
    .execute(&mut *tx)
    .await
    .context("record_open: insert position")?;

    upsert_blacklist(&mut *tx, &new_pos.symbol, new_pos.blacklist_valid_until_eastern).await?;

    tx.commit().await.context("record_open: commit")?;
    Ok(position_id)
}

pub async fn open_positions(pool: &PgPool) -> Result<Vec<Position>> {
    let rows = sqlx::query(
        r#"
        select position_id, open_order_client_id, symbol, shares, cost_price_micros,
               fees_paid_micros, open_time_eastern, scheduled_exit_eastern,
               high_water_price_micros, triggering_strike_micros, meta
        from positions
        where status = 'OPEN'
        order by symbol
        "#,
    )
    .fetch_all(pool)
    .await
    .context("open_positions failed")?;

    Ok(rows
        .into_iter()
        .map(|r| Position {
            position_id: r.get("position_id"),
            open_order_client_id: r.get("open_order_client_id"),
            symbol: r.get("symbol"),
            shares: r.get("shares"),
            cost_price: from_micros(r.get::<i64, _>("cost_price_micros")),
            fees_paid: from_micros(r.get::<i64, _>("fees_paid_micros")),
            open_time_eastern: r.get("open_time_eastern"),
            scheduled_exit_eastern: r.get("scheduled_exit_eastern"),
            high_water_price: from_micros(r.get::<i64, _>("high_water_price_micros")),
            triggering_strike: r
                .get::<Option<i64>, _>("triggering_strike_micros")
                .map(from_micros),
            meta: r.get("meta"),
        })
        .collect())
}

/// Raises `high_water_price` for a position. Monotonic non-decreasing: a
/// caller passing a lower value is a no-op.
pub async fn update_high_water_price(pool: &PgPool, position_id: Uuid, price: f64) -> Result<()> {
    sqlx::query(
        r#"
        update positions
        set high_water_price_micros = greatest(high_water_price_micros, $2)
        where position_id = $1 and status = 'OPEN'
        "#,
    )
    .bind(position_id)
    .bind(to_micros(price))
    .execute(pool)
    .await
    .context("update_high_water_price failed")?;
    Ok(())
}

/// Reconciliation auto-fix: adjusts an open position's share count to match
/// the broker's reported quantity, leaving `cost_price_micros` untouched so
/// the position's cost basis survives the correction.
pub async fn update_position_shares(pool: &PgPool, position_id: Uuid, broker_shares: i64) -> Result<()> {
    sqlx::query(
        r#"
        update positions
        set shares = $2
        where position_id = $1 and status = 'OPEN'
        "#,
    )
    .bind(position_id)
    .bind(broker_shares)
    .execute(pool)
    .await
    .context("update_position_shares failed")?;
    Ok(())
}

/// Closes a position. The closing sell order's event must already have been
/// recorded via [`record_order_event`].
pub async fn record_close(
    pool: &PgPool,
    position_id: Uuid,
    close_order_client_id: &str,
    close_reason: &str,
    closed_at_eastern: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        update positions
        set status = 'CLOSED',
            close_order_client_id = $2,
            close_reason = $3,
            closed_at_eastern = $4
        where position_id = $1 and status = 'OPEN'
        "#,
    )
    .bind(position_id)
    .bind(close_order_client_id)
    .bind(close_reason)
    .bind(closed_at_eastern)
    .execute(pool)
    .await
    .context("record_close failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub date_eastern: NaiveDate,
    pub extras_local: Vec<String>,
    pub extras_broker: Vec<String>,
    pub share_mismatches: Value,
    pub equity_delta: f64,
    pub cash_delta: f64,
    pub auto_fixed: bool,
}

pub async fn record_reconciliation(pool: &PgPool, report: &ReconciliationReport) -> Result<()> {
    sqlx::query(
        r#"
        insert into reconciliation_reports (
            date_eastern, extras_local, extras_broker, share_mismatches,
            equity_delta_micros, cash_delta_micros, auto_fixed
        ) values ($1,$2,$3,$4,$5,$6,$7)
        "#,
    )
    .bind(report.date_eastern)
    .bind(serde_json::to_value(&report.extras_local)?)
    .bind(serde_json::to_value(&report.extras_broker)?)
    .bind(&report.share_mismatches)
    .bind(to_micros(report.equity_delta))
    .bind(to_micros(report.cash_delta))
    .bind(report.auto_fixed)
    .execute(pool)
    .await
    .context("record_reconciliation failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkpoint (external file-watcher state; this crate only persists it)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub last_processed_file: Option<String>,
    pub last_offset: Option<i64>,
}

pub async fn load_checkpoint(pool: &PgPool) -> Result<Checkpoint> {
    let row = sqlx::query("select last_processed_file, last_offset from checkpoints where id = true")
        .fetch_optional(pool)
        .await
        .context("load_checkpoint failed")?;

    Ok(match row {
        Some(r) => Checkpoint {
            last_processed_file: r.get("last_processed_file"),
            last_offset: r.get("last_offset"),
        },
        None => Checkpoint::default(),
    })
}

pub async fn save_checkpoint(pool: &PgPool, state: &Checkpoint, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        insert into checkpoints (id, last_processed_file, last_offset, updated_eastern)
        values (true, $1, $2, $3)
        on conflict (id) do update set
            last_processed_file = excluded.last_processed_file,
            last_offset = excluded.last_offset,
            updated_eastern = excluded.updated_eastern
        "#,
    )
    .bind(&state.last_processed_file)
    .bind(state.last_offset)
    .bind(now)
    .execute(pool)
    .await
    .context("save_checkpoint failed")?;
    Ok(())
}
