//! Static subject → slug mapping tables
//!
//! File format:
//! ```json
//! {
//!   "loc":  { "ids": { "sh85047910": "fantasy" }, "labels": { "fantasy fiction": "fantasy" } },
//!   "fast": { "ids": { "fst00921614": "fantasy" }, "labels": {} }
//! }
//! ```
//! Keys are normalized on load (ids: trim + lowercase; labels: trim,
//! lowercase, single spaces) so lookups only normalize the query side.

use crate::error::{MetaError, MetaResult};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use shelf_common::text::normalize_term;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Id and label tables for one source vocabulary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceMapping {
    #[serde(default)]
    pub ids: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl SourceMapping {
    fn normalized(self) -> Self {
        Self {
            ids: self
                .ids
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .collect(),
            labels: self
                .labels
                .into_iter()
                .map(|(k, v)| (normalize_term(&k), v))
                .collect(),
        }
    }
}

/// All mapping tables, keyed by source id
#[derive(Debug, Clone, Default)]
pub struct SubjectMappings {
    sources: HashMap<String, SourceMapping>,
}

static SHARED_MAPPINGS: OnceCell<Arc<SubjectMappings>> = OnceCell::new();

impl SubjectMappings {
    /// Parse mapping JSON, normalizing keys
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, SourceMapping> = serde_json::from_str(json)?;
        Ok(Self {
            sources: raw
                .into_iter()
                .map(|(source, mapping)| (source.to_lowercase(), mapping.normalized()))
                .collect(),
        })
    }

    /// Load the mapping file; a missing file yields empty tables
    pub fn load(path: &Path) -> MetaResult<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Subject mapping file not found, every term will resolve by fallback"
                );
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(MetaError::DataFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mappings = Self::from_json(&json).map_err(|e| MetaError::DataFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(
            path = %path.display(),
            sources = mappings.sources.len(),
            "Loaded subject mappings"
        );
        Ok(mappings)
    }

    /// Process-wide tables, loaded on first use.
    ///
    /// Later calls return the first loaded tables regardless of `path`.
    pub fn shared(path: &Path) -> MetaResult<Arc<Self>> {
        SHARED_MAPPINGS
            .get_or_try_init(|| Self::load(path).map(Arc::new))
            .cloned()
    }

    pub fn source(&self, source: &str) -> Option<&SourceMapping> {
        self.sources.get(&source.to_lowercase())
    }

    /// Add an id mapping (builder style, used by tools and tests)
    pub fn with_id(mut self, source: &str, id: &str, slug: &str) -> Self {
        self.sources
            .entry(source.to_lowercase())
            .or_default()
            .ids
            .insert(id.trim().to_lowercase(), slug.to_string());
        self
    }

    /// Add a label mapping (builder style, used by tools and tests)
    pub fn with_label(mut self, source: &str, label: &str, slug: &str) -> Self {
        self.sources
            .entry(source.to_lowercase())
            .or_default()
            .labels
            .insert(normalize_term(label), slug.to_string());
        self
    }
}
