//! Taxonomy reverse index
//!
//! Built once from the taxonomy JSON file and kept for the process lifetime.
//! Maps every slug to its taxonomy type, group and parent so merged labels
//! can be classified without touching the database.
//!
//! File format:
//! ```json
//! {
//!   "genre": [
//!     { "slug": "fantasy", "name": "Fantasy", "group": "speculative",
//!       "children": [ { "slug": "epic-fantasy", "name": "Epic Fantasy" } ] }
//!   ],
//!   "topic": [ { "slug": "dragons" } ]
//! }
//! ```
//! A term without an explicit `group` inherits its parent's group; a root
//! term without one is its own group.

use crate::error::{MetaError, MetaResult};
use crate::types::TaxonomyHints;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct TaxonomyTerm {
    slug: String,
    name: Option<String>,
    group: Option<String>,
    #[serde(default)]
    children: Vec<TaxonomyTerm>,
}

/// Classification of one slug
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyMeta {
    pub name: Option<String>,
    pub taxonomy_type: String,
    pub group: Option<String>,
    pub parent: Option<String>,
}

impl TaxonomyMeta {
    pub fn hints(&self) -> TaxonomyHints {
        TaxonomyHints {
            taxonomy_type: Some(self.taxonomy_type.clone()),
            taxonomy_group: self.group.clone(),
            taxonomy_parent: self.parent.clone(),
        }
    }
}

/// slug → classification
#[derive(Debug, Clone, Default)]
pub struct TaxonomyIndex {
    by_slug: HashMap<String, TaxonomyMeta>,
}

static SHARED_TAXONOMY: OnceCell<Arc<TaxonomyIndex>> = OnceCell::new();

impl TaxonomyIndex {
    /// Build the index from taxonomy JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let types: BTreeMap<String, Vec<TaxonomyTerm>> = serde_json::from_str(json)?;
        let mut index = Self::default();

        for (taxonomy_type, terms) in &types {
            for term in terms {
                index.insert_term(taxonomy_type, term, None, None);
            }
        }

        Ok(index)
    }

    /// Load the taxonomy file; a missing file yields an empty index
    pub fn load(path: &Path) -> MetaResult<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Taxonomy file not found, labels stay unclassified");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(MetaError::DataFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let index = Self::from_json(&json).map_err(|e| MetaError::DataFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), slugs = index.len(), "Loaded taxonomy index");
        Ok(index)
    }

    /// Process-wide index, built on first use
    pub fn shared(path: &Path) -> MetaResult<Arc<Self>> {
        SHARED_TAXONOMY
            .get_or_try_init(|| Self::load(path).map(Arc::new))
            .cloned()
    }

    pub fn lookup(&self, slug: &str) -> Option<&TaxonomyMeta> {
        self.by_slug.get(slug)
    }

    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }

    fn insert_term(
        &mut self,
        taxonomy_type: &str,
        term: &TaxonomyTerm,
        parent: Option<&str>,
        inherited_group: Option<&str>,
    ) {
        let group = term
            .group
            .as_deref()
            .or(inherited_group)
            .map(str::to_string)
            .or_else(|| parent.is_none().then(|| term.slug.clone()));

        // First definition wins when a slug appears twice
        self.by_slug
            .entry(term.slug.clone())
            .or_insert_with(|| TaxonomyMeta {
                name: term.name.clone(),
                taxonomy_type: taxonomy_type.to_string(),
                group: group.clone(),
                parent: parent.map(str::to_string),
            });

        for child in &term.children {
            self.insert_term(taxonomy_type, child, Some(&term.slug), group.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "genre": [
            { "slug": "fantasy", "name": "Fantasy", "group": "speculative",
              "children": [
                { "slug": "epic-fantasy", "name": "Epic Fantasy",
                  "children": [ { "slug": "grimdark" } ] }
              ] },
            { "slug": "mystery", "children": [ { "slug": "cozy-mystery" } ] }
        ],
        "topic": [ { "slug": "dragons", "name": "Dragons" } ]
    }"#;

    #[test]
    fn test_root_term() {
        let index = TaxonomyIndex::from_json(SAMPLE).unwrap();
        let fantasy = index.lookup("fantasy").unwrap();
        assert_eq!(fantasy.taxonomy_type, "genre");
        assert_eq!(fantasy.group.as_deref(), Some("speculative"));
        assert_eq!(fantasy.parent, None);
    }

    #[test]
    fn test_nested_terms_inherit_group() {
        let index = TaxonomyIndex::from_json(SAMPLE).unwrap();
        let grimdark = index.lookup("grimdark").unwrap();
        assert_eq!(grimdark.taxonomy_type, "genre");
        assert_eq!(grimdark.group.as_deref(), Some("speculative"));
        assert_eq!(grimdark.parent.as_deref(), Some("epic-fantasy"));
    }

    #[test]
    fn test_root_without_group_is_own_group() {
        let index = TaxonomyIndex::from_json(SAMPLE).unwrap();
        assert_eq!(index.lookup("mystery").unwrap().group.as_deref(), Some("mystery"));
        assert_eq!(index.lookup("cozy-mystery").unwrap().group.as_deref(), Some("mystery"));
    }

    #[test]
    fn test_hints_and_unknown() {
        let index = TaxonomyIndex::from_json(SAMPLE).unwrap();
        let hints = index.lookup("dragons").unwrap().hints();
        assert_eq!(hints.taxonomy_type.as_deref(), Some("topic"));
        assert!(index.lookup("space-opera").is_none());
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = TaxonomyIndex::load(&dir.path().join("taxonomy.json")).unwrap();
        assert!(index.is_empty());
    }
}
