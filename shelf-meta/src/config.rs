//! Configuration resolution for shelf-meta
//!
//! Every option resolves with ENV → TOML → compiled default priority. The
//! TOML file is located by `--config`, then `SHELF_CONFIG`, then
//! `~/.config/shelf/shelf-meta.toml`. Unset options are never an error; a
//! value that is present but invalid fails startup.
//!
//! ```toml
//! cache_dir = "/var/lib/shelf/cache"
//! max_retries = 3
//!
//! [loc]
//! delay_ms = 1500
//!
//! [fast]
//! api_key = "..."
//! strict = false
//! ```

use crate::error::{MetaError, MetaResult};
use crate::utils::RetryPolicy;
use serde::Deserialize;
use shelf_common::config::{default_data_dir, env_bool, env_parse, env_string, load_toml_config, resolve_config_file};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "SHELF_CONFIG";
pub const CONFIG_FILE_NAME: &str = "shelf-meta.toml";
pub const DEFAULT_USER_AGENT: &str = concat!(
    "shelf-meta/",
    env!("CARGO_PKG_VERSION"),
    " (book metadata enrichment)"
);
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Per-source connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub endpoint: String,
    /// Minimum delay between requests
    pub delay_ms: u64,
    /// Random extra delay in `[0, jitter_ms)`
    pub jitter_ms: u64,
    /// Overrides the global User-Agent
    pub user_agent: Option<String>,
    /// Refuse generated slugs (adapters only)
    pub strict: bool,
}

/// Per-source section of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceFileSettings {
    pub endpoint: Option<String>,
    pub delay_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub strict: Option<bool>,
    pub api_key: Option<String>,
    pub max_suggestions: Option<u32>,
}

/// Shape of `shelf-meta.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetaConfigFile {
    pub cache_dir: Option<PathBuf>,
    pub review_queue_path: Option<PathBuf>,
    pub mappings_path: Option<PathBuf>,
    pub taxonomy_path: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub retry_max_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub loc: SourceFileSettings,
    pub fast: SourceFileSettings,
    pub wikidata: SourceFileSettings,
    pub openlibrary: SourceFileSettings,
    pub google_books: SourceFileSettings,
    pub wikipedia: SourceFileSettings,
}

/// Fully resolved engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaConfig {
    pub cache_dir: PathBuf,
    pub review_queue_path: PathBuf,
    pub mappings_path: PathBuf,
    pub taxonomy_path: PathBuf,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    pub loc: SourceSettings,
    pub fast: SourceSettings,
    pub wikidata: SourceSettings,
    pub openlibrary: SourceSettings,
    pub google_books: SourceSettings,
    pub wikipedia: SourceSettings,
    pub fast_api_key: Option<String>,
    pub fast_max_suggestions: u32,
    pub google_books_api_key: Option<String>,
}

/// Compiled defaults for one source
struct SourceDefaults {
    env_prefix: &'static str,
    endpoint: &'static str,
    delay_ms: u64,
    jitter_ms: u64,
}

const LOC: SourceDefaults = SourceDefaults {
    env_prefix: "SHELF_LOC",
    endpoint: crate::adapters::loc::DEFAULT_ENDPOINT,
    delay_ms: 1000,
    jitter_ms: 250,
};
const FAST: SourceDefaults = SourceDefaults {
    env_prefix: "SHELF_FAST",
    endpoint: crate::adapters::fast::DEFAULT_ENDPOINT,
    delay_ms: 500,
    jitter_ms: 150,
};
const WIKIDATA: SourceDefaults = SourceDefaults {
    env_prefix: "SHELF_WIKIDATA",
    endpoint: crate::adapters::wikidata::DEFAULT_ENDPOINT,
    delay_ms: 1000,
    jitter_ms: 250,
};
const OPENLIBRARY: SourceDefaults = SourceDefaults {
    env_prefix: "SHELF_OPENLIBRARY",
    endpoint: crate::harvest::openlibrary::DEFAULT_ENDPOINT,
    delay_ms: 350,
    jitter_ms: 100,
};
const GOOGLE_BOOKS: SourceDefaults = SourceDefaults {
    env_prefix: "SHELF_GOOGLE_BOOKS",
    endpoint: crate::harvest::google_books::DEFAULT_ENDPOINT,
    delay_ms: 250,
    jitter_ms: 100,
};
const WIKIPEDIA: SourceDefaults = SourceDefaults {
    env_prefix: "SHELF_WIKIPEDIA",
    endpoint: crate::harvest::wikipedia::DEFAULT_ENDPOINT,
    delay_ms: 200,
    jitter_ms: 100,
};

impl MetaConfig {
    /// Locate and load the TOML file, then apply environment overrides
    pub fn load(config_path: Option<&Path>) -> MetaResult<Self> {
        let path = resolve_config_file(config_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        if let Some(path) = &path {
            info!(path = %path.display(), "Using config file");
        }
        let file: MetaConfigFile = load_toml_config(path.as_deref())?;
        Self::resolve(file)
    }

    /// Apply environment overrides and defaults to a parsed TOML file
    pub fn resolve(file: MetaConfigFile) -> MetaResult<Self> {
        let data_dir = default_data_dir();

        let retry = RetryPolicy {
            max_retries: layered("SHELF_MAX_RETRIES", file.max_retries, RetryPolicy::default().max_retries)?,
            base_delay_ms: layered("SHELF_RETRY_BASE_MS", file.retry_base_ms, RetryPolicy::default().base_delay_ms)?,
            max_delay_ms: layered("SHELF_RETRY_MAX_MS", file.retry_max_ms, RetryPolicy::default().max_delay_ms)?,
        };
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(MetaError::Config(format!(
                "retry base delay {}ms exceeds max delay {}ms",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }

        let http_timeout_secs = layered("SHELF_HTTP_TIMEOUT_SECS", file.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS)?;
        if http_timeout_secs == 0 {
            return Err(MetaError::Config("HTTP timeout must be at least 1 second".to_string()));
        }

        let fast_max_suggestions = layered(
            "SHELF_FAST_MAX_SUGGESTIONS",
            file.fast.max_suggestions,
            crate::adapters::fast::DEFAULT_MAX_SUGGESTIONS,
        )?;
        if fast_max_suggestions == 0 {
            return Err(MetaError::Config("FAST max suggestions must be at least 1".to_string()));
        }

        let config = Self {
            cache_dir: layered_path("SHELF_CACHE_DIR", file.cache_dir, data_dir.join("cache")),
            review_queue_path: layered_path(
                "SHELF_REVIEW_QUEUE_PATH",
                file.review_queue_path,
                data_dir.join("review-queue.json"),
            ),
            mappings_path: layered_path(
                "SHELF_MAPPINGS_PATH",
                file.mappings_path,
                data_dir.join("subject-mappings.json"),
            ),
            taxonomy_path: layered_path("SHELF_TAXONOMY_PATH", file.taxonomy_path, data_dir.join("taxonomy.json")),
            user_agent: env_string("SHELF_USER_AGENT")
                .or(file.user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry,
            http_timeout: Duration::from_secs(http_timeout_secs),
            loc: source_settings(&LOC, &file.loc)?,
            fast: source_settings(&FAST, &file.fast)?,
            wikidata: source_settings(&WIKIDATA, &file.wikidata)?,
            openlibrary: source_settings(&OPENLIBRARY, &file.openlibrary)?,
            google_books: source_settings(&GOOGLE_BOOKS, &file.google_books)?,
            wikipedia: source_settings(&WIKIPEDIA, &file.wikipedia)?,
            fast_api_key: env_string("SHELF_FAST_API_KEY").or(file.fast.api_key).filter(|k| is_valid_key(k)),
            fast_max_suggestions,
            google_books_api_key: env_string("SHELF_GOOGLE_BOOKS_API_KEY")
                .or(file.google_books.api_key)
                .filter(|k| is_valid_key(k)),
        };

        if config.fast_api_key.is_none() {
            debug!("FAST API key not configured, using anonymous requests");
        }
        if config.google_books_api_key.is_none() {
            debug!("Google Books API key not configured, using anonymous requests");
        }

        Ok(config)
    }
}

impl Default for MetaConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        let defaults = |d: &SourceDefaults| SourceSettings {
            endpoint: d.endpoint.to_string(),
            delay_ms: d.delay_ms,
            jitter_ms: d.jitter_ms,
            user_agent: None,
            strict: true,
        };
        Self {
            cache_dir: data_dir.join("cache"),
            review_queue_path: data_dir.join("review-queue.json"),
            mappings_path: data_dir.join("subject-mappings.json"),
            taxonomy_path: data_dir.join("taxonomy.json"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            loc: defaults(&LOC),
            fast: defaults(&FAST),
            wikidata: defaults(&WIKIDATA),
            openlibrary: defaults(&OPENLIBRARY),
            google_books: defaults(&GOOGLE_BOOKS),
            wikipedia: defaults(&WIKIPEDIA),
            fast_api_key: None,
            fast_max_suggestions: crate::adapters::fast::DEFAULT_MAX_SUGGESTIONS,
            google_books_api_key: None,
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn layered<T>(env_name: &str, file_value: Option<T>, default: T) -> MetaResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_parse(env_name)?.or(file_value).unwrap_or(default))
}

fn layered_path(env_name: &str, file_value: Option<PathBuf>, default: PathBuf) -> PathBuf {
    env_string(env_name)
        .map(PathBuf::from)
        .or(file_value)
        .unwrap_or(default)
}

fn source_settings(defaults: &SourceDefaults, file: &SourceFileSettings) -> MetaResult<SourceSettings> {
    let key = |suffix: &str| format!("{}_{}", defaults.env_prefix, suffix);

    Ok(SourceSettings {
        endpoint: env_string(&key("ENDPOINT"))
            .or_else(|| file.endpoint.clone())
            .unwrap_or_else(|| defaults.endpoint.to_string()),
        delay_ms: layered(&key("DELAY_MS"), file.delay_ms, defaults.delay_ms)?,
        jitter_ms: layered(&key("JITTER_MS"), file.jitter_ms, defaults.jitter_ms)?,
        user_agent: env_string(&key("USER_AGENT")).or_else(|| file.user_agent.clone()),
        strict: env_bool(&key("STRICT"))?.or(file.strict).unwrap_or(true),
    })
}
