//! Registry of which config leaf pointers each run mode actually reads.
//!
//! Kept separate from [`EngineConfig`] deliberately: the typed struct says
//! what the *shape* of config is, this registry says what each mode
//! *consumes* — used by [`crate::report_unused_keys`] to catch config keys
//! that exist in a deployed YAML file but nothing reads, a common source of
//! silent drift between a config file and the code that was meant to honor
//! it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Backtest,
    Paper,
    Live,
}

pub fn consumed_pointers(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Backtest => BACKTEST,
        ConfigMode::Paper => PAPER,
        ConfigMode::Live => LIVE,
    }
}

static COMMON: &[&str] = &[
    "/engine",
    "/monitor",
    "/entry",
    "/risk",
    "/exits",
    "/blacklist",
    "/execution",
    "/reconciliation",
    "/filters",
    "/data/providers/market_data",
    "/data/gap_fallback_policy",
];

static BACKTEST: &[&str] = COMMON;

static PAPER: &[&str] = &[
    "/engine",
    "/monitor",
    "/entry",
    "/risk",
    "/exits",
    "/blacklist",
    "/execution",
    "/reconciliation",
    "/filters",
    "/data/providers/market_data",
    "/data/gap_fallback_policy",
    "/broker/keys_env",
];

static LIVE: &[&str] = PAPER;
