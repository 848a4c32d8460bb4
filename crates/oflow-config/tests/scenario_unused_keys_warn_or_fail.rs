use oflow_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys under a section a mode consumes are not flagged.
/// 4) A stray top-level section is flagged even when its name resembles a
///    consumed one.
/// 5) Deterministic ordering of unused pointers.

const MINIMAL_PAPER_YAML: &str = r#"
engine:
  mode: "live"
monitor:
  check_interval_seconds: 20
entry:
  time_windows:
    - ["09:35", "15:45"]
risk:
  per_trade_cap: 0.05
exits:
  stop_loss: 0.1
blacklist:
  blacklist_days: 3
execution:
  slippage: 0.001
reconciliation:
  reconciliation_time_eastern: "17:00"
broker:
  keys_env:
    api_key: "OFLOW_BROKER_API_KEY_MAIN"
    api_secret: "OFLOW_BROKER_API_SECRET_MAIN"
"#;

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = format!("{MINIMAL_PAPER_YAML}\nunused_section:\n  foo: 123\n  bar: 456\n");

    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let report =
        report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
            .expect("warn mode must not error");

    assert!(!report.is_clean(), "report should detect unused keys");
    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/unused_section/foo".to_string()),
        "missing unused pointer for foo"
    );
    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/unused_section/bar".to_string()),
        "missing unused pointer for bar"
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = format!("{MINIMAL_PAPER_YAML}\nunused_section:\n  foo: 1\n");

    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let result = report_unused_keys(ConfigMode::Live, &loaded.config_json, UnusedKeyPolicy::Fail);

    assert!(
        result.is_err(),
        "fail policy must error when unused keys exist"
    );
    let msg = format!("{:?}", result.err().unwrap());
    assert!(
        msg.contains("CONFIG_UNUSED_KEYS"),
        "error message should contain CONFIG_UNUSED_KEYS"
    );
}

#[test]
fn only_consumed_keys_are_clean_in_paper_mode() {
    let loaded =
        load_layered_yaml_from_strings(&[MINIMAL_PAPER_YAML]).expect("config load must succeed");

    let report =
        report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
            .expect("warn mode must not error");

    assert!(
        report.is_clean(),
        "config should be clean when it only uses consumed sections: {:?}",
        report.unused_leaf_pointers
    );
}

#[test]
fn unrecognised_top_level_section_is_flagged_even_with_similar_name() {
    // `risk_tuning` is not a recognised section — it must not be mistaken
    // for a leaf under `/risk`, which Paper does consume wholesale.
    let yaml = format!("{MINIMAL_PAPER_YAML}\nrisk_tuning:\n  extra: 999\n");

    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let report =
        report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
            .expect("warn mode must not error");

    assert!(
        report
            .unused_leaf_pointers
            .contains(&"/risk_tuning/extra".to_string()),
        "unrecognised sibling section must remain unused"
    );
}

#[test]
fn deterministic_unused_pointer_ordering() {
    let yaml = format!("{MINIMAL_PAPER_YAML}\nunused:\n  b: 2\n  a: 1\n");

    let loaded = load_layered_yaml_from_strings(&[&yaml]).expect("config load must succeed");

    let report =
        report_unused_keys(ConfigMode::Paper, &loaded.config_json, UnusedKeyPolicy::Warn)
            .expect("warn mode must not error");

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/unused/a".to_string(), "/unused/b".to_string()],
        "unused pointers must be sorted deterministically"
    );
}
