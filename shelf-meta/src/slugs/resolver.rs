//! Slug resolution for external vocabulary terms
//!
//! Resolution tiers, first hit wins:
//! 1. **id** - the source's `ids` table, tried with the raw id, the id without
//!    an `http(s)://` scheme, and the id's last path segment
//! 2. **label** - the source's `labels` table, tried as-is and with en/em
//!    dashes replaced by hyphens
//! 3. **generated** - slugified label (skipped in strict mode)
//!
//! Terms that miss tiers 1 and 2 are queued for review in the background.

use super::mappings::{SourceMapping, SubjectMappings};
use super::review_queue::{ReviewQueue, UnknownSubject};
use crate::types::Confidence;
use serde::{Deserialize, Serialize};
use shelf_common::text::{normalize_term, replace_dashes, slugify};
use std::sync::Arc;

/// Which tier produced a slug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Id,
    Label,
    Generated,
}

/// A resolved slug and how it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugResolution {
    pub slug: String,
    pub match_type: MatchType,
}

impl SlugResolution {
    /// Table matches are trusted; generated slugs are best effort
    pub fn confidence(&self) -> Confidence {
        match self.match_type {
            MatchType::Id | MatchType::Label => Confidence::High,
            MatchType::Generated => Confidence::Medium,
        }
    }
}

/// Per-call resolution switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Refuse generated slugs
    pub strict: bool,
    /// Queue table misses for review
    pub queue_review: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strict: false,
            queue_review: true,
        }
    }
}

impl ResolveOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Maps `(source, label, id)` to a canonical slug
#[derive(Debug, Clone)]
pub struct SlugResolver {
    mappings: Arc<SubjectMappings>,
    review_queue: Option<Arc<ReviewQueue>>,
}

impl SlugResolver {
    pub fn new(mappings: Arc<SubjectMappings>, review_queue: Option<Arc<ReviewQueue>>) -> Self {
        Self {
            mappings,
            review_queue,
        }
    }

    pub fn review_queue(&self) -> Option<&Arc<ReviewQueue>> {
        self.review_queue.as_ref()
    }

    /// Resolve one term. `None` when no tier produced a usable slug.
    pub fn resolve_slug(
        &self,
        source: &str,
        value: &str,
        id: Option<&str>,
        options: ResolveOptions,
    ) -> Option<SlugResolution> {
        let normalized_value = normalize_term(value);
        let normalized_id = id
            .map(|i| i.trim().to_lowercase())
            .filter(|i| !i.is_empty());

        let table_match = self.mappings.source(source).and_then(|mapping| {
            match_id(mapping, normalized_id.as_deref())
                .or_else(|| match_label(mapping, &normalized_value))
        });
        if table_match.is_some() {
            return table_match;
        }

        if options.queue_review && (!normalized_value.is_empty() || normalized_id.is_some()) {
            if let Some(queue) = &self.review_queue {
                queue.queue_detached(UnknownSubject {
                    source: source.to_string(),
                    id: id.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()),
                    label: value.trim().to_string(),
                });
            }
        }

        if options.strict {
            return None;
        }

        let slug = slugify(value);
        if slug.is_empty() {
            return None;
        }

        Some(SlugResolution {
            slug,
            match_type: MatchType::Generated,
        })
    }
}

/// Id lookup keys: as given, scheme stripped, last path segment
fn id_candidates(id: &str) -> Vec<String> {
    let mut candidates = vec![id.to_string()];

    let without_scheme = id
        .strip_prefix("https://")
        .or_else(|| id.strip_prefix("http://"))
        .unwrap_or(id);
    candidates.push(without_scheme.to_string());

    if let Some(last) = without_scheme
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
    {
        candidates.push(last.to_string());
    }

    candidates.dedup();
    candidates
}

fn match_id(mapping: &SourceMapping, id: Option<&str>) -> Option<SlugResolution> {
    let id = id?;
    id_candidates(id).iter().find_map(|key| {
        mapping.ids.get(key).map(|slug| SlugResolution {
            slug: slug.clone(),
            match_type: MatchType::Id,
        })
    })
}

fn match_label(mapping: &SourceMapping, value: &str) -> Option<SlugResolution> {
    if value.is_empty() {
        return None;
    }
    let dashed = replace_dashes(value);
    [value, dashed.as_str()].iter().find_map(|key| {
        mapping.labels.get(*key).map(|slug| SlugResolution {
            slug: slug.clone(),
            match_type: MatchType::Label,
        })
    })
}
