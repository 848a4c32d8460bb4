//! Deterministic fixtures, in-memory fakes, and config/signal builders shared
//! by scenario tests across crates. Never a dependency of anything that
//! ships — only of `[dev-dependencies]`.

mod bars_csv;
mod fake_gateway;
mod fixtures;

pub use bars_csv::load_bars_csv;
pub use fake_gateway::FakeGateway;
pub use fixtures::{base_engine_config, raw_signal};
