//! Configuration resolution: ENV → TOML → compiled default
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SHELF_* variables are marked with #[serial].

use serial_test::serial;
use shelf_meta::config::{MetaConfig, MetaConfigFile};
use shelf_meta::MetaError;
use std::io::Write;
use std::path::PathBuf;

const VARS: &[&str] = &[
    "SHELF_CACHE_DIR",
    "SHELF_LOC_DELAY_MS",
    "SHELF_LOC_STRICT",
    "SHELF_FAST_API_KEY",
    "SHELF_MAX_RETRIES",
    "SHELF_RETRY_BASE_MS",
    "SHELF_RETRY_MAX_MS",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
    let path = dir.join("shelf-meta.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
#[serial]
fn test_toml_file_values_apply() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        cache_dir = "/var/cache/shelf"
        max_retries = 1

        [loc]
        delay_ms = 2000
        strict = false

        [fast]
        api_key = "toml-key"
        "#,
    );

    let config = MetaConfig::load(Some(&path)).unwrap();

    assert_eq!(config.cache_dir, PathBuf::from("/var/cache/shelf"));
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.loc.delay_ms, 2000);
    assert!(!config.loc.strict);
    assert!(config.wikidata.strict);
    assert_eq!(config.fast_api_key.as_deref(), Some("toml-key"));
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    std::env::set_var("SHELF_CACHE_DIR", "/tmp/env-cache");
    std::env::set_var("SHELF_LOC_DELAY_MS", "50");
    std::env::set_var("SHELF_LOC_STRICT", "true");
    std::env::set_var("SHELF_FAST_API_KEY", "env-key");

    let file: MetaConfigFile = toml::from_str(
        r#"
        cache_dir = "/var/cache/shelf"
        [loc]
        delay_ms = 2000
        strict = false
        [fast]
        api_key = "toml-key"
        "#,
    )
    .unwrap();
    let config = MetaConfig::resolve(file).unwrap();

    assert_eq!(config.cache_dir, PathBuf::from("/tmp/env-cache"));
    assert_eq!(config.loc.delay_ms, 50);
    assert!(config.loc.strict);
    assert_eq!(config.fast_api_key.as_deref(), Some("env-key"));

    clear_env();
}

#[test]
#[serial]
fn test_defaults_without_file() {
    clear_env();
    let config = MetaConfig::resolve(MetaConfigFile::default()).unwrap();
    let defaults = MetaConfig::default();

    assert_eq!(config.loc, defaults.loc);
    assert_eq!(config.fast.endpoint, shelf_meta::adapters::fast::DEFAULT_ENDPOINT);
    assert_eq!(config.fast_api_key, None);
    assert_eq!(config.retry, defaults.retry);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
#[serial]
fn test_whitespace_api_key_ignored() {
    clear_env();
    std::env::set_var("SHELF_FAST_API_KEY", "   ");
    let file: MetaConfigFile = toml::from_str("[fast]\napi_key = \"  \"\n").unwrap();

    let config = MetaConfig::resolve(file).unwrap();
    assert_eq!(config.fast_api_key, None);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_retry_window_rejected() {
    clear_env();
    std::env::set_var("SHELF_RETRY_BASE_MS", "5000");
    std::env::set_var("SHELF_RETRY_MAX_MS", "100");

    let result = MetaConfig::resolve(MetaConfigFile::default());
    assert!(matches!(result, Err(MetaError::Config(_))));

    clear_env();
}

#[test]
#[serial]
fn test_unparseable_env_value_rejected() {
    clear_env();
    std::env::set_var("SHELF_LOC_DELAY_MS", "soon");

    assert!(MetaConfig::resolve(MetaConfigFile::default()).is_err());

    clear_env();
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    assert!(MetaConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
}
