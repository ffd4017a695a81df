use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use wiki_mirror::load_config::{apply_overrides, load_config};

const FULL_CONFIG: &str = r#"
output_dir: ./tmp/docs
space_id: "7300000000000000001"
root_node_token: wikcnRoot
freshness_days: 7
resolve_ancestor_slugs: false
transport:
  min_interval_ms: 500
  max_retries: 2
standalone_pages:
  - obj_token: doxcnAbout
    title: About
    output: ../src/pages/about.md
"#;

const MINIMAL_CONFIG: &str = r#"
output_dir: ./tmp/docs
space_id: space
root_node_token: root
"#;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn reset_env() {
    for var in [
        "FEISHU_APP_ID",
        "FEISHU_APP_SECRET",
        "SKIP_FEISHU_SYNC",
        "FEISHU_INCREMENTAL_DAYS",
    ] {
        env::remove_var(var);
    }
}

fn set_credentials() {
    env::set_var("FEISHU_APP_ID", "cli_test");
    env::set_var("FEISHU_APP_SECRET", "secret");
}

#[test]
#[serial]
fn loads_full_config_with_env_credentials() {
    reset_env();
    set_credentials();
    let file = config_file(FULL_CONFIG);

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.sync.output_dir, PathBuf::from("./tmp/docs"));
    assert_eq!(config.sync.space_id, "7300000000000000001");
    assert_eq!(config.sync.root_node_token, "wikcnRoot");
    assert_eq!(config.sync.freshness_days, 7);
    assert!(!config.sync.resolve_ancestor_slugs);
    assert_eq!(config.sync.transport.min_interval_ms, 500);
    assert_eq!(config.sync.transport.max_retries, 2);
    assert_eq!(config.sync.transport.timeout_ms, 30_000);
    assert_eq!(config.sync.standalone_pages.len(), 1);
    assert_eq!(
        config.sync.standalone_pages[0].output,
        PathBuf::from("../src/pages/about.md")
    );

    let credentials = config.credentials.expect("credentials present");
    assert_eq!(credentials.app_id, "cli_test");
    assert!(!format!("{credentials:?}").contains("\"secret\""));
}

#[test]
#[serial]
fn minimal_config_uses_defaults() {
    reset_env();
    set_credentials();
    let file = config_file(MINIMAL_CONFIG);

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.sync.freshness_days, 3);
    assert!(!config.sync.disabled);
    assert!(config.sync.resolve_ancestor_slugs);
    assert_eq!(config.sync.transport.min_interval_ms, 300);
    assert_eq!(config.sync.transport.max_retries, 0);
    assert!(config.sync.standalone_pages.is_empty());
}

#[test]
#[serial]
fn environment_overrides_window_and_disables_sync() {
    reset_env();
    env::set_var("FEISHU_INCREMENTAL_DAYS", "14");
    env::set_var("SKIP_FEISHU_SYNC", "true");
    let file = config_file(MINIMAL_CONFIG);

    let config = load_config(file.path()).expect("Disabled run needs no credentials");
    assert!(config.sync.disabled);
    assert_eq!(config.sync.freshness_days, 14);
    assert!(config.credentials.is_none());
    reset_env();
}

#[test]
#[serial]
fn missing_credentials_are_reported_by_name() {
    reset_env();
    env::set_var("FEISHU_APP_ID", "cli_test");
    let file = config_file(MINIMAL_CONFIG);

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("FEISHU_APP_SECRET"), "got: {err}");
}

#[test]
#[serial]
fn invalid_day_count_is_rejected() {
    reset_env();
    set_credentials();
    env::set_var("FEISHU_INCREMENTAL_DAYS", "three");
    let file = config_file(MINIMAL_CONFIG);

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("FEISHU_INCREMENTAL_DAYS"), "got: {err}");
    reset_env();
}

#[test]
#[serial]
fn invalid_yaml_reports_a_parse_error() {
    reset_env();
    set_credentials();
    let file = config_file("not-yaml: [:::");

    let msg = load_config(file.path()).unwrap_err().to_string();
    assert!(msg.contains("parse") || msg.contains("YAML"), "got: {msg}");
}

#[test]
#[serial]
fn missing_required_key_fails() {
    reset_env();
    set_credentials();
    let file = config_file("output_dir: ./docs\nspace_id: s\n");

    let msg = format!("{:#}", load_config(file.path()).unwrap_err());
    assert!(msg.contains("root_node_token"), "got: {msg}");
}

#[test]
fn cli_flags_override_the_window() {
    let mut config = wiki_mirror_core::config::SyncConfig::new("./docs", "s", "r");
    apply_overrides(&mut config, true, None);
    assert_eq!(config.freshness_days, 0);
    apply_overrides(&mut config, false, Some(10));
    assert_eq!(config.freshness_days, 10);
    apply_overrides(&mut config, false, None);
    assert_eq!(config.freshness_days, 10);
}
