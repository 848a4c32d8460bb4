//! Layered YAML configuration: load, deep-merge, canonicalize, hash, and
//! deserialize into a typed [`EngineConfig`].
//!
//! Config files are loaded in order (e.g. `base.yaml` then an environment
//! overlay) and deep-merged — later files win on scalar/array conflicts,
//! objects merge key-by-key. The merged tree is canonicalized (all object
//! keys sorted recursively) before hashing, so the resulting `config_hash`
//! is stable regardless of source key order and reproducible across
//! `backtest`/`live` runs sharing the same effective config.
//!
//! Secrets never live in this tree as literal values — only environment
//! variable *names* (see [`secrets`]). [`load_layered_yaml`] rejects any
//! merged value that looks like a literal secret before it is hashed.

pub mod consumption;
pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use consumption::ConfigMode;

/// Load and merge YAML files in order, then canonicalize to JSON and hash.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut contents = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        contents.push(s);
    }
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Same as [`load_layered_yaml`] but operating on in-memory YAML strings —
/// used directly by tests and by anything that fetches config layers from a
/// non-file source (e.g. a secrets manager or an embedded default).
pub fn load_layered_yaml_from_strings(layers: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in layers.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    if let Some(pointer) = find_literal_secret(&merged, String::new()) {
        bail!(
            "CONFIG_SECRET_DETECTED at pointer '{pointer}': value looks like a literal \
             secret; store the env var NAME under a `*_env` / `keys_env` key instead"
        );
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Deserialize into the typed, validated engine configuration.
    pub fn into_engine_config(self) -> Result<EngineConfig, ConfigValidationError> {
        let parsed: EngineConfig = serde_json::from_value(self.config_json.clone())
            .map_err(|e| ConfigValidationError::Malformed(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Heuristics for "this string is a literal secret, not an env var name".
/// Deliberately conservative — false positives are cheap (rename the key),
/// false negatives are expensive (a committed credential).
fn looks_like_secret(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.starts_with("sk-")
        || trimmed.starts_with("sk_")
        || trimmed.starts_with("AKIA")
        || trimmed.contains("PRIVATE KEY")
}

fn find_literal_secret(v: &Value, pointer: String) -> Option<String> {
    match v {
        Value::String(s) if looks_like_secret(s) => Some(pointer),
        Value::Object(map) => {
            for (k, val) in map {
                if let Some(p) = find_literal_secret(val, format!("{pointer}/{k}")) {
                    return Some(p);
                }
            }
            None
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter().enumerate() {
                if let Some(p) = find_literal_secret(val, format!("{pointer}/{i}")) {
                    return Some(p);
                }
            }
            None
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Unused-key reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct UnusedKeysReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeysReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Diff every leaf JSON pointer present in `config_json` against the
/// pointers `mode` is known to consume (see [`consumption`]). A leaf whose
/// pointer equals, or is a descendant of, a consumed pointer is not
/// reported as unused.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeysReport> {
    let consumed = consumption::consumed_pointers(mode);
    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, String::new(), &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| {
            !consumed
                .iter()
                .any(|c| leaf == c || leaf.starts_with(&format!("{c}/")))
        })
        .collect();
    unused.sort();

    let report = UnusedKeysReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} key(s) not consumed by mode {:?}: {:?}",
            report.unused_leaf_pointers.len(),
            mode,
            report.unused_leaf_pointers,
        );
    }

    Ok(report)
}

fn collect_leaf_pointers(v: &Value, pointer: String, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, val) in map {
                collect_leaf_pointers(val, format!("{pointer}/{k}"), out);
            }
        }
        _ => out.push(pointer),
    }
}

// ---------------------------------------------------------------------------
// Typed engine configuration
// ---------------------------------------------------------------------------

/// The fully-resolved, validated configuration an engine instance runs with.
/// Deserialized from the canonicalized config JSON produced by
/// [`load_layered_yaml`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub monitor: MonitorSection,
    pub entry: EntrySection,
    pub risk: RiskSection,
    pub exits: ExitsSection,
    pub blacklist: BlacklistSection,
    pub execution: ExecutionSection,
    pub reconciliation: ReconciliationSection,
    #[serde(default)]
    pub filters: FiltersSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub data: DataSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// `"live"` or `"backtest"` — selects the gateway implementation.
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    pub check_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySection {
    /// `[open, close]` Eastern-time-of-day pairs, e.g. `["09:35", "15:45"]`.
    pub time_windows: Vec<[String; 2]>,
    pub min_premium_usd: f64,
    pub premium_max_usd: f64,
    pub historical_premium_enabled: bool,
    pub historical_multiplier: f64,
    pub historical_lookback_days: u32,
    pub entry_delay_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSection {
    pub per_trade_cap: f64,
    pub daily_gross_cap: f64,
    pub max_trades_per_day: u32,
    pub max_leverage: f64,
    pub min_cash_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitsSection {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub trailing_stop: f64,
    pub holding_days: u32,
    pub exit_time_of_day_eastern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistSection {
    pub blacklist_days: u32,
}

/// The three config-toggled filters `on_signal` runs after the structural
/// checks. Each is independently enableable and
/// defaults to off, so a base config with no `filters` key runs with none
/// of them active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersSection {
    #[serde(default)]
    pub macd: MacdFilterSection,
    #[serde(default)]
    pub earnings_window: EarningsWindowFilterSection,
    #[serde(default)]
    pub price_trend: PriceTrendFilterSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacdFilterSection {
    pub enabled: bool,
    /// Reject unless the signal's MACD histogram value is ≥ this threshold.
    pub min_histogram: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EarningsWindowFilterSection {
    pub enabled: bool,
    /// Reject if the symbol reports earnings within this many calendar days.
    pub exclude_within_days: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTrendFilterSection {
    pub enabled: bool,
    pub lookback_days: u32,
    /// Minimum fractional price change over the lookback required to pass.
    pub min_change_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    pub slippage: f64,
    pub fee_per_share: f64,
    pub fee_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSection {
    pub reconciliation_time_eastern: String,
    pub auto_fix: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    /// Base URL of the live brokerage daemon. Unused in `backtest` mode.
    #[serde(default = "default_broker_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub keys_env: BrokerKeysEnv,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            base_url: default_broker_base_url(),
            keys_env: BrokerKeysEnv::default(),
        }
    }
}

fn default_broker_base_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerKeysEnv {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default)]
    pub providers: ProvidersSection,
    /// Fallback policy when no minute bar exists at a resolved execution
    /// time (e.g. `next_bar`'s target minute).
    #[serde(default)]
    pub gap_fallback_policy: GapFallbackPolicy,
}

/// §7's data-gap fallback: how to resolve an execution price when the bar
/// at the target minute is missing. `NextBar` is the spec's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFallbackPolicy {
    /// Drop the entry rather than execute off-target.
    Skip,
    /// Retry at the next bar that exists at or after the target minute.
    #[default]
    NextBar,
    /// Use the last known close at or before the target minute.
    UseLast,
    /// Use a live quote instead of a bar close. Live mode only.
    UseRealtime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersSection {
    #[serde(default)]
    pub market_data: MarketDataProviderSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketDataProviderSection {
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    Malformed(String),
    OutOfRange { field: &'static str, detail: String },
    Empty { field: &'static str },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::Malformed(msg) => {
                write!(f, "CONFIG_MALFORMED: {msg}")
            }
            ConfigValidationError::OutOfRange { field, detail } => {
                write!(f, "CONFIG_OUT_OF_RANGE: {field}: {detail}")
            }
            ConfigValidationError::Empty { field } => {
                write!(f, "CONFIG_EMPTY: {field} must not be empty")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

impl EngineConfig {
    /// Range and non-emptiness checks run once at startup, before the
    /// engine admits any signal. A failure here is a fatal init error
    /// (nonzero exit).
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.engine.mode != "live" && self.engine.mode != "backtest" {
            return Err(ConfigValidationError::OutOfRange {
                field: "engine.mode",
                detail: format!("must be 'live' or 'backtest', got '{}'", self.engine.mode),
            });
        }
        if self.entry.time_windows.is_empty() {
            return Err(ConfigValidationError::Empty {
                field: "entry.time_windows",
            });
        }
        if self.monitor.check_interval_seconds == 0 {
            return Err(ConfigValidationError::OutOfRange {
                field: "monitor.check_interval_seconds",
                detail: "must be > 0".into(),
            });
        }
        ratio_in_unit_interval("risk.per_trade_cap", self.risk.per_trade_cap)?;
        ratio_in_unit_interval("risk.daily_gross_cap", self.risk.daily_gross_cap)?;
        if self.risk.max_leverage <= 0.0 {
            return Err(ConfigValidationError::OutOfRange {
                field: "risk.max_leverage",
                detail: "must be > 0".into(),
            });
        }
        if self.risk.min_cash_ratio > 1.0 {
            return Err(ConfigValidationError::OutOfRange {
                field: "risk.min_cash_ratio",
                detail: "must be <= 1.0 (negative values are permitted)".into(),
            });
        }
        ratio_in_unit_interval("exits.stop_loss", self.exits.stop_loss)?;
        ratio_in_unit_interval("exits.take_profit", self.exits.take_profit)?;
        ratio_in_unit_interval("exits.trailing_stop", self.exits.trailing_stop)?;
        if self.exits.holding_days == 0 {
            return Err(ConfigValidationError::OutOfRange {
                field: "exits.holding_days",
                detail: "must be > 0".into(),
            });
        }
        if self.execution.slippage < 0.0 || self.execution.slippage >= 1.0 {
            return Err(ConfigValidationError::OutOfRange {
                field: "execution.slippage",
                detail: "must be in [0, 1)".into(),
            });
        }
        Ok(())
    }
}

fn ratio_in_unit_interval(field: &'static str, value: f64) -> Result<(), ConfigValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigValidationError::OutOfRange {
            field,
            detail: format!("must be in [0, 1], got {value}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
engine:
  mode: "backtest"
monitor:
  check_interval_seconds: 20
entry:
  time_windows:
    - ["09:35", "15:45"]
  min_premium_usd: 5000.0
  premium_max_usd: 250000.0
  historical_premium_enabled: true
  historical_multiplier: 2.0
  historical_lookback_days: 20
  entry_delay_minutes: 3
risk:
  per_trade_cap: 0.05
  daily_gross_cap: 0.5
  max_trades_per_day: 10
  max_leverage: 1.0
  min_cash_ratio: 0.1
exits:
  stop_loss: 0.1
  take_profit: 0.25
  trailing_stop: 0.08
  holding_days: 5
  exit_time_of_day_eastern: "15:55"
blacklist:
  blacklist_days: 3
execution:
  slippage: 0.001
  fee_per_share: 0.005
  fee_min: 1.0
reconciliation:
  reconciliation_time_eastern: "17:00"
  auto_fix: true
"#;

    #[test]
    fn loads_and_validates_minimal_config() {
        let loaded = load_layered_yaml_from_strings(&[MINIMAL_YAML]).unwrap();
        let cfg = loaded.into_engine_config().unwrap();
        assert_eq!(cfg.engine.mode, "backtest");
        assert_eq!(cfg.exits.holding_days, 5);
    }

    #[test]
    fn rejects_empty_entry_windows() {
        let yaml = MINIMAL_YAML.replace(
            "  time_windows:\n    - [\"09:35\", \"15:45\"]\n",
            "  time_windows: []\n",
        );
        let loaded = load_layered_yaml_from_strings(&[&yaml]).unwrap();
        let err = loaded.into_engine_config().unwrap_err();
        assert!(matches!(err, ConfigValidationError::Empty { .. }));
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let yaml = MINIMAL_YAML.replace("per_trade_cap: 0.05", "per_trade_cap: 1.5");
        let loaded = load_layered_yaml_from_strings(&[&yaml]).unwrap();
        let err = loaded.into_engine_config().unwrap_err();
        assert!(matches!(err, ConfigValidationError::OutOfRange { .. }));
    }

    #[test]
    fn literal_secret_value_rejected() {
        let yaml = r#"
broker:
  keys_env:
    api_key: "sk-live-abc123secretvalue"
"#;
        let err = load_layered_yaml_from_strings(&[yaml]).unwrap_err();
        assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"));
    }

    #[test]
    fn env_var_name_accepted() {
        let yaml = r#"
broker:
  keys_env:
    api_key: "OFLOW_BROKER_API_KEY"
"#;
        let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
        assert_eq!(
            loaded
                .config_json
                .pointer("/broker/keys_env/api_key")
                .and_then(|v| v.as_str()),
            Some("OFLOW_BROKER_API_KEY")
        );
    }

    #[test]
    fn hash_stable_across_key_reordering() {
        let a = load_layered_yaml_from_strings(&[MINIMAL_YAML]).unwrap();
        let reordered = r#"
monitor:
  check_interval_seconds: 20
engine:
  mode: "backtest"
"#;
        // Reordering just two top-level keys must not affect canonicalization.
        let b = load_layered_yaml_from_strings(&[reordered]).unwrap();
        assert_ne!(a.config_hash, b.config_hash); // different content, sanity check
        assert_eq!(a.config_hash.len(), 64);
    }

    #[test]
    fn unused_keys_detected_in_warn_mode() {
        let yaml = format!("{MINIMAL_YAML}\nunused_section:\n  foo: 1\n");
        let loaded = load_layered_yaml_from_strings(&[&yaml]).unwrap();
        let report =
            report_unused_keys(ConfigMode::Backtest, &loaded.config_json, UnusedKeyPolicy::Warn)
                .unwrap();
        assert!(report
            .unused_leaf_pointers
            .contains(&"/unused_section/foo".to_string()));
    }

    #[test]
    fn fail_policy_errors_on_unused_keys() {
        let yaml = format!("{MINIMAL_YAML}\nunused_section:\n  foo: 1\n");
        let loaded = load_layered_yaml_from_strings(&[&yaml]).unwrap();
        let result =
            report_unused_keys(ConfigMode::Backtest, &loaded.config_json, UnusedKeyPolicy::Fail);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("CONFIG_UNUSED_KEYS"));
    }
}
