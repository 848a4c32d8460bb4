//! Pre-trade risk simulation.
//!
//! Given a candidate entry, simulates the post-trade gross-exposure ratio,
//! leverage, and cash ratio against the account's configured limits, and
//! offers a fixed-step size reduction when a check fails. Deterministic,
//! pure arithmetic — no IO, no time, no gateway calls. `oflow-strategy`
//! injects this crate's `evaluate`/`scale_down_to_fit` as the last step of
//! `on_signal`'s rejection chain.

mod engine;
mod types;

pub use engine::{evaluate, scale_down_to_fit};
pub use types::{RiskCheckInput, RiskCheckResult, RiskLimits};
