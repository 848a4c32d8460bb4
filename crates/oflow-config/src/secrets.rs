//! Runtime secret resolution.
//!
//! Config YAML stores only env var **names** (e.g. `"OFLOW_BROKER_API_KEY"`),
//! never values — see [`crate::find_literal_secret`]. At startup, callers
//! invoke [`resolve_secrets_for_mode`] once; the returned [`ResolvedSecrets`]
//! is threaded into gateway/market-data constructors rather than scattering
//! `std::env::var` calls through the codebase. `Debug` redacts every field.
//!
//! Mode-aware enforcement: `live` requires broker + market-data keys,
//! `backtest` requires nothing (a replay run touches neither).

use anyhow::{bail, Result};
use serde_json::Value;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// `None` if the named env var was absent or blank.
    pub broker_api_key: Option<String>,
    pub broker_api_secret: Option<String>,
    pub market_data_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("broker_api_key", &redacted(&self.broker_api_key))
            .field("broker_api_secret", &redacted(&self.broker_api_secret))
            .field("market_data_api_key", &redacted(&self.market_data_api_key))
            .finish()
    }
}

fn redacted(v: &Option<String>) -> &'static str {
    match v {
        Some(_) => "<REDACTED>",
        None => "None",
    }
}

struct SecretEnvNames {
    broker_api_key_var: String,
    broker_api_secret_var: String,
    market_data_api_key_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        broker_api_key_var: read_str_at(config_json, "/broker/keys_env/api_key")
            .unwrap_or_else(|| "OFLOW_BROKER_API_KEY".to_string()),
        broker_api_secret_var: read_str_at(config_json, "/broker/keys_env/api_secret")
            .unwrap_or_else(|| "OFLOW_BROKER_API_SECRET".to_string()),
        market_data_api_key_var: read_str_at(config_json, "/data/providers/market_data/api_key_env")
            .unwrap_or_else(|| "OFLOW_MARKET_DATA_API_KEY".to_string()),
    }
}

/// Resolve all secrets from the environment for `mode` (`"live"` or
/// `"backtest"`, case-insensitive). Returns `Err` naming the first missing
/// required env var — never its value — when a required secret is absent.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: &str) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);
    let mode_lower = mode.trim().to_ascii_lowercase();

    let broker_api_key = resolve_env(&names.broker_api_key_var);
    let broker_api_secret = resolve_env(&names.broker_api_secret_var);
    let market_data_api_key = resolve_env(&names.market_data_api_key_var);

    match mode_lower.as_str() {
        "live" => {
            if broker_api_key.is_none() {
                bail!(
                    "SECRETS_MISSING mode=live: required env var '{}' (broker api_key) \
                     is not set or empty",
                    names.broker_api_key_var,
                );
            }
            if broker_api_secret.is_none() {
                bail!(
                    "SECRETS_MISSING mode=live: required env var '{}' (broker api_secret) \
                     is not set or empty",
                    names.broker_api_secret_var,
                );
            }
            if market_data_api_key.is_none() {
                bail!(
                    "SECRETS_MISSING mode=live: required env var '{}' (market data api_key) \
                     is not set or empty",
                    names.market_data_api_key_var,
                );
            }
        }
        "backtest" => {
            // No required secrets — a replay run touches neither broker nor provider.
        }
        other => {
            bail!(
                "SECRETS_UNKNOWN_MODE: unrecognised mode '{other}'; expected 'live' or 'backtest'"
            );
        }
    }

    Ok(ResolvedSecrets {
        broker_api_key,
        broker_api_secret,
        market_data_api_key,
    })
}
