// core-rs/crates/oflow-db/src/lib.rs
use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "OFLOW_DATABASE_URL";

pub mod md;
pub mod trading;

pub use md::{
    fetch_md_bars, CoverageTotals, FetchMdBarsArgs, IngestCsvArgs, IngestProviderBarsArgs,
    IngestResult, MdBarRow, MdQualityReport, ProviderBar,
};
pub use md::{ingest_csv_to_md_bars, ingest_provider_bars_to_md_bars};

pub use trading::{
    blacklist_until, commit_daily_capacity, daily_used, from_micros, historical_mean_premium,
    insert_signal_if_new, load_checkpoint, open_positions, record_close, record_open,
    record_order_event, record_reconciliation, reserve_daily_capacity, rollback_daily_capacity,
    save_checkpoint, to_micros, update_high_water_price, update_position_shares, Checkpoint,
    DailyUsed, NewPosition, OrderEvent, OrderResult, OrderStatus, Position, ReconciliationReport,
    ReservationOutcome, Side, Signal,
};

/// Connect to Postgres using OFLOW_DATABASE_URL.
pub async fn connect_from_env() -> anyhow::Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Test helper used by integration tests:
/// - Connect using OFLOW_DATABASE_URL
/// - Ensure migrations are applied
pub async fn testkit_db_pool() -> anyhow::Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> anyhow::Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='signals'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_trading_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_trading_schema: bool,
}
