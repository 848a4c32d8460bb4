//! Wires the three trading loops around a shared
//! `Arc<dyn MarketGateway>`, `PgPool`, and [`AuditWriter`]: the signal worker
//! that turns accepted signals into opened positions, the position monitor
//! that walks the exit-priority ladder, and the reconciliation worker that
//! compares the local book against the broker once a day. Everything each
//! loop needs beyond its own persistence/gateway reads — config, the run id,
//! the audit log, the shared shutdown handle — is passed in rather than
//! reached for as ambient global state.

pub mod gateway_select;
pub mod position_monitor;
pub mod reconciliation;
pub mod shutdown;
pub mod signal_ingest;
pub mod signal_worker;

pub use gateway_select::{build_live_gateway, build_sim_gateway, validate_mode};
pub use reconciliation::{run_reconciliation_once, ReconciliationOutcome};
pub use shutdown::Shutdown;
pub use signal_worker::signal_channel;

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use oflow_audit::AuditWriter;
use oflow_config::EngineConfig;
use oflow_db::Signal;
use oflow_gateway::MarketGateway;

/// The three trading loops, spawned on the caller's runtime and left running
/// until `shutdown` is triggered. The signal worker drains `signal_rx`, which
/// the caller keeps the sending half of (fed by a file-watcher/producer
/// adapter outside this crate).
pub struct TradingLoops {
    pub signal_worker: JoinHandle<()>,
    pub position_monitor: JoinHandle<()>,
    pub reconciliation: JoinHandle<()>,
}

pub fn spawn_trading_loops(
    pool: PgPool,
    gateway: Arc<dyn MarketGateway>,
    config: EngineConfig,
    run_id: Uuid,
    audit: Arc<Mutex<AuditWriter>>,
    signal_rx: tokio::sync::mpsc::Receiver<Signal>,
    shutdown: Shutdown,
) -> TradingLoops {
    let signal_worker = tokio::spawn(signal_worker::run_signal_worker(
        pool.clone(),
        gateway.clone(),
        config.clone(),
        run_id,
        audit.clone(),
        signal_rx,
        shutdown.clone(),
    ));

    let position_monitor = tokio::spawn(position_monitor::run_position_monitor(
        pool.clone(),
        gateway.clone(),
        config.clone(),
        run_id,
        audit.clone(),
        shutdown.clone(),
    ));

    let reconciliation = tokio::spawn(reconciliation::run_reconciliation_worker(
        pool,
        gateway,
        config,
        run_id,
        audit,
        shutdown,
    ));

    TradingLoops { signal_worker, position_monitor, reconciliation }
}
