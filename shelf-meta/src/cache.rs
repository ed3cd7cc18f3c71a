//! File-backed response cache
//!
//! Layout: `{cache_dir}/{source}/{sanitized_key}.json`, each file holding a
//! [`CacheEntry`]. Entries never expire; a key is re-fetched only on a miss.
//! A missing file is a miss (`Ok(None)`); every other I/O or decode failure is
//! returned to the caller.

use crate::error::{MetaError, MetaResult};
use crate::types::AdapterInput;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shelf_common::isbn::normalize_isbn;
use shelf_common::text::sanitize_key;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Maximum author names folded into a title-based key
const KEY_MAX_AUTHORS: usize = 3;

/// Cached payload with its fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub fetched_at: DateTime<Utc>,
    pub data: T,
}

impl<T> CacheEntry<T> {
    /// Wrap `data` stamped with the current time
    pub fn new(data: T) -> Self {
        Self {
            fetched_at: Utc::now(),
            data,
        }
    }
}

/// On-disk cache rooted at one directory, namespaced per source
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage path for `(source, key)`
    pub fn path_for(&self, source: &str, key: &str) -> PathBuf {
        let stem = match sanitize_key(key) {
            s if s.is_empty() => "_".to_string(),
            s => s,
        };
        self.dir
            .join(sanitize_key(source))
            .join(format!("{}.json", stem))
    }

    /// Read an entry; `Ok(None)` on a miss
    pub async fn read<T>(&self, source: &str, key: &str) -> MetaResult<Option<CacheEntry<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.path_for(source, key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error(&path, e.into())),
        };

        let entry = serde_json::from_slice(&bytes).map_err(|e| cache_error(&path, e.into()))?;
        tracing::debug!(source, key, path = %path.display(), "Cache hit");
        Ok(Some(entry))
    }

    /// Write (fully overwrite) an entry, creating directories on demand
    pub async fn write<T>(&self, source: &str, key: &str, entry: &CacheEntry<T>) -> MetaResult<()>
    where
        T: Serialize,
    {
        let path = self.path_for(source, key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_error(&path, e.into()))?;
        }

        let body = serde_json::to_vec_pretty(entry).map_err(|e| cache_error(&path, e.into()))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| cache_error(&path, e.into()))?;

        tracing::debug!(source, key, path = %path.display(), "Cache write");
        Ok(())
    }
}

fn cache_error(path: &Path, source: shelf_common::Error) -> MetaError {
    MetaError::Cache {
        path: path.display().to_string(),
        source,
    }
}

/// Identity key for "the same book" across calls.
///
/// Preference: ISBN-13, ISBN-10, DOI, OCLC, then a composite of the sanitized
/// title and the first three sanitized author names.
pub fn build_cache_key(input: &AdapterInput) -> String {
    if let Some(isbn) = identifier(input.isbn13.as_deref(), true) {
        return format!("isbn13:{}", isbn);
    }
    if let Some(isbn) = identifier(input.isbn10.as_deref(), true) {
        return format!("isbn10:{}", isbn);
    }
    if let Some(doi) = identifier(input.doi.as_deref(), false) {
        return format!("doi:{}", doi.to_lowercase());
    }
    if let Some(oclc) = identifier(input.oclc.as_deref(), false) {
        return format!("oclc:{}", oclc);
    }

    let title = input
        .title()
        .map(sanitize_key)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "untitled".to_string());

    let authors: Vec<String> = input
        .authors()
        .map(sanitize_key)
        .filter(|a| !a.is_empty())
        .take(KEY_MAX_AUTHORS)
        .collect();
    let authors = if authors.is_empty() {
        "na".to_string()
    } else {
        authors.join("+")
    };

    format!("title:{}|authors:{}", title, authors)
}

fn identifier(raw: Option<&str>, isbn: bool) -> Option<String> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
    if isbn {
        Some(normalize_isbn(raw).unwrap_or_else(|| raw.to_string()))
    } else {
        Some(raw.to_string())
    }
}
