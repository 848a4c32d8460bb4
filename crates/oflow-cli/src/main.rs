//! `oflow`: operator entry point for database setup, market-data ingestion,
//! backtest replay, and live-run supervision.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "oflow")]
#[command(about = "Unusual-options-flow swing engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database setup and health commands.
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute the layered config hash and print canonical JSON.
    ConfigHash {
        /// Paths in merge order (base -> env -> engine overrides -> ...).
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Market-data ingestion commands.
    Md {
        #[command(subcommand)]
        cmd: MdCmd,
    },

    /// Live-run supervision commands.
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },

    /// Backtest replay commands.
    Backtest {
        #[command(subcommand)]
        cmd: BacktestCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Check connectivity and whether the trading schema is present.
    Status,
    /// Apply pending embedded migrations.
    Migrate,
}

#[derive(Subcommand)]
enum MdCmd {
    /// Ingest a CSV of OHLC bars into `md_bars`.
    IngestCsv {
        #[arg(long)]
        path: String,
        #[arg(long)]
        timeframe: String,
        #[arg(long)]
        source: String,
    },
    /// Fetch bars from a named provider and ingest into `md_bars`.
    IngestProvider {
        #[arg(long)]
        source: String,
        /// Comma-separated symbol list.
        #[arg(long)]
        symbols: String,
        #[arg(long)]
        timeframe: String,
        /// Inclusive start date, YYYY-MM-DD.
        #[arg(long)]
        start: String,
        /// Inclusive end date, YYYY-MM-DD.
        #[arg(long)]
        end: String,
    },
}

#[derive(Subcommand)]
enum RunCmd {
    /// Start the live-trading supervisor: signal ingestion, the signal
    /// worker, the position monitor, and daily reconciliation, until
    /// SIGINT/SIGTERM.
    Start {
        /// Layered config paths in merge order.
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Engine identifier used in run-id derivation and run artifacts.
        #[arg(long, default_value = "oflow-swing-v1")]
        engine: String,

        /// CSV file the minimal reference signal producer polls for new rows.
        #[arg(long)]
        signals_file: String,

        /// Timezone the signals file's `date`/`time` columns are expressed in.
        #[arg(long, default_value = "America/New_York")]
        source_tz: String,

        /// Root directory run artifacts are written under.
        #[arg(long, default_value = "exports")]
        exports_root: String,

        /// How often, in seconds, the signal file producer polls for new rows.
        #[arg(long, default_value_t = 5)]
        poll_interval_seconds: u64,

        /// Grace period, in seconds, the trading loops get to stop cleanly
        /// after a shutdown signal before being abandoned.
        #[arg(long, default_value_t = 30)]
        shutdown_grace_seconds: u64,
    },
}

#[derive(Subcommand)]
enum BacktestCmd {
    /// Replay a fixed CSV of signals through the live entry/exit pipeline.
    Run {
        /// Layered config paths in merge order; engine.mode must be "backtest".
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, default_value = "oflow-swing-v1")]
        engine: String,

        /// CSV of raw signal rows to replay.
        #[arg(long)]
        signals_csv: String,

        /// Inclusive replay window start, YYYY-MM-DD.
        #[arg(long)]
        from: String,

        /// Inclusive replay window end, YYYY-MM-DD.
        #[arg(long)]
        to: String,

        #[arg(long, default_value_t = 100_000.0)]
        starting_cash: f64,

        #[arg(long, default_value = "America/New_York")]
        source_tz: String,

        #[arg(long, default_value = "exports")]
        exports_root: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = oflow_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = oflow_db::status(&pool).await?;
                    println!("db_ok={} has_trading_schema={}", s.ok, s.has_trading_schema);
                }
                DbCmd::Migrate => {
                    oflow_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = oflow_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Md { cmd } => match cmd {
            MdCmd::IngestCsv { path, timeframe, source } => {
                commands::md::md_ingest_csv(path, timeframe, source).await?;
            }
            MdCmd::IngestProvider { source, symbols, timeframe, start, end } => {
                commands::md::md_ingest_provider(source, symbols, timeframe, start, end).await?;
            }
        },

        Commands::Run { cmd } => match cmd {
            RunCmd::Start {
                config_paths,
                engine,
                signals_file,
                source_tz,
                exports_root,
                poll_interval_seconds,
                shutdown_grace_seconds,
            } => {
                commands::run::run_start(
                    config_paths,
                    engine,
                    signals_file,
                    source_tz,
                    exports_root,
                    poll_interval_seconds,
                    shutdown_grace_seconds,
                )
                .await?;
            }
        },

        Commands::Backtest { cmd } => match cmd {
            BacktestCmd::Run {
                config_paths,
                engine,
                signals_csv,
                from,
                to,
                starting_cash,
                source_tz,
                exports_root,
            } => {
                commands::backtest::backtest_run(
                    config_paths,
                    engine,
                    signals_csv,
                    from,
                    to,
                    starting_cash,
                    source_tz,
                    exports_root,
                )
                .await?;
            }
        },
    }

    Ok(())
}
