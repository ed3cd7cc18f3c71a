//! Configuration file discovery and environment helpers
//!
//! Resolution order used by the shelf tools:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/shelf/<file>`), then `/etc/shelf/<file>` on Linux
//! 4. No file (compiled defaults apply)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Application directory name under the platform config/data dirs
const APP_DIR: &str = "shelf";

/// Locate a TOML config file.
///
/// Explicit paths (CLI or environment) are returned even when the file does
/// not exist so that loading fails loudly instead of silently using defaults.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_string(env_var_name) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file, or the type's default when no path is given
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    debug!(path = %path.display(), "Loading TOML config");

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// OS-dependent default data folder (cache, review queue)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./shelf_data"))
}

/// Read an environment variable, treating empty/whitespace values as unset
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable.
///
/// Unset is `Ok(None)`; a value that does not parse is a configuration error.
pub fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?} is invalid: {}", name, raw, e))),
    }
}

/// Read a boolean environment variable (`1/0`, `true/false`, `yes/no`, `on/off`)
pub fn env_bool(name: &str) -> Result<Option<bool>> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(Error::Config(format!(
                "{}={:?} is not a boolean",
                name, raw
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        name: Option<String>,
        retries: Option<u32>,
    }

    #[test]
    fn test_cli_path_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        let resolved = resolve_config_file(Some(&path), "SHELF_TEST_UNUSED", "x.toml");
        assert_eq!(resolved, Some(path));
    }

    #[test]
    #[serial]
    fn test_env_path_used_when_no_cli() {
        std::env::set_var("SHELF_TEST_CONFIG_PATH", "/tmp/from-env.toml");
        let resolved = resolve_config_file(None, "SHELF_TEST_CONFIG_PATH", "x.toml");
        std::env::remove_var("SHELF_TEST_CONFIG_PATH");
        assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
    }

    #[test]
    fn test_load_defaults_without_path() {
        let sample: Sample = load_toml_config(None).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        std::fs::write(&path, "name = \"loc\"\nretries = 3\n").unwrap();

        let sample: Sample = load_toml_config(Some(&path)).unwrap();
        assert_eq!(sample.name.as_deref(), Some("loc"));
        assert_eq!(sample.retries, Some(3));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let result: Result<Sample> = load_toml_config(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_parse_invalid_number() {
        std::env::set_var("SHELF_TEST_NUMBER", "abc");
        let result: Result<Option<u64>> = env_parse("SHELF_TEST_NUMBER");
        std::env::remove_var("SHELF_TEST_NUMBER");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_blank_is_unset() {
        std::env::set_var("SHELF_TEST_BLANK", "   ");
        assert_eq!(env_string("SHELF_TEST_BLANK"), None);
        std::env::remove_var("SHELF_TEST_BLANK");
    }

    #[test]
    #[serial]
    fn test_env_bool_variants() {
        std::env::set_var("SHELF_TEST_BOOL", "Yes");
        assert_eq!(env_bool("SHELF_TEST_BOOL").unwrap(), Some(true));
        std::env::set_var("SHELF_TEST_BOOL", "off");
        assert_eq!(env_bool("SHELF_TEST_BOOL").unwrap(), Some(false));
        std::env::set_var("SHELF_TEST_BOOL", "maybe");
        assert!(env_bool("SHELF_TEST_BOOL").is_err());
        std::env::remove_var("SHELF_TEST_BOOL");
    }
}
