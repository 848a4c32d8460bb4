//! End-of-day reconciliation. Pure comparison logic: no
//! persistence access and no gateway calls of its own — the reconciliation
//! worker in `oflow-runtime` gathers both snapshots and carries out whatever
//! [`plan_auto_fix`] returns.

mod engine;

pub use engine::{reconcile, plan_auto_fix, AutoFixAction, ReconciliationInput, Report, ShareMismatch};
