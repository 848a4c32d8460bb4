//! The engine's trading decisions: two pure functions,
//! `on_signal` and `on_position_check`, plus the deterministic fingerprints
//! (`signal_id`, `client_id`) and the signal-ingestion conversion that feeds
//! them. Neither decision function touches persistence or the gateway
//! directly — the trading loops in `oflow-runtime` gather the context these
//! functions need and perform every side effect the resulting decision implies.

mod entry;
mod exit;
mod fingerprint;
mod ingest;

pub use entry::{
    compute_exec_time_eastern, on_signal, EntryContext, EntryDecision, EntryRejection,
    FilterKind, ResolvedExec,
};
pub use exit::{on_position_check, ExitDecision, ExitReason, PositionCheckOutcome};
pub use fingerprint::{client_id, signal_id};
pub use ingest::signal_from_raw;
