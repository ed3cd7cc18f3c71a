//! Core types shared by the adapters, the orchestrator and the harvest pass
//!
//! # Flow
//! `AdapterInput` → `SourceAdapter::lookup` → `AdapterOutput` (labels + notes)
//! → `MetadataOrchestrator` → `AggregatedLabel`s with per-source provenance.

use crate::cache::FileCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Input
// ============================================================================

/// Bibliographic query key for one book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterInput {
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub oclc: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

impl AdapterInput {
    /// Trimmed, non-empty title
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Trimmed, non-empty author names in input order
    pub fn authors(&self) -> impl Iterator<Item = &str> {
        self.authors.iter().map(|a| a.trim()).filter(|a| !a.is_empty())
    }

    /// Normalized ISBN-13, if present and well-formed
    pub fn isbn13(&self) -> Option<String> {
        self.isbn13
            .as_deref()
            .and_then(shelf_common::isbn::normalize_isbn)
            .filter(|i| i.len() == 13)
    }

    /// Normalized ISBN-10, if present and well-formed
    pub fn isbn10(&self) -> Option<String> {
        self.isbn10
            .as_deref()
            .and_then(shelf_common::isbn::normalize_isbn)
            .filter(|i| i.len() == 10)
    }

    /// Whether a lookup can do anything useful (an ISBN or a title)
    pub fn is_meaningful(&self) -> bool {
        self.isbn13().is_some() || self.isbn10().is_some() || self.title().is_some()
    }
}

// ============================================================================
// Confidence / kind
// ============================================================================

/// Coarse trust level attached to a resolved label.
///
/// Ordered `Low < Medium < High`, so `max()` picks the most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// One step less trusted (saturating at `Low`)
    pub fn demote(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic kind of a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Genre,
    Topic,
    Setting,
    Audience,
    Format,
    Person,
    Place,
}

impl LabelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelKind::Genre => "genre",
            LabelKind::Topic => "topic",
            LabelKind::Setting => "setting",
            LabelKind::Audience => "audience",
            LabelKind::Format => "format",
            LabelKind::Person => "person",
            LabelKind::Place => "place",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "genre" => Ok(LabelKind::Genre),
            "topic" => Ok(LabelKind::Topic),
            "setting" => Ok(LabelKind::Setting),
            "audience" => Ok(LabelKind::Audience),
            "format" => Ok(LabelKind::Format),
            "person" => Ok(LabelKind::Person),
            "place" => Ok(LabelKind::Place),
            other => Err(format!("unknown label kind: {}", other)),
        }
    }
}

// ============================================================================
// Adapter output
// ============================================================================

/// Taxonomy classification of a slug (type/group/parent)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyHints {
    pub taxonomy_type: Option<String>,
    pub taxonomy_group: Option<String>,
    pub taxonomy_parent: Option<String>,
}

/// One candidate label produced by a single source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterLabel {
    pub slug: String,
    pub name: String,
    pub source: String,
    pub confidence: Confidence,
    pub kind: LabelKind,
    /// Raw evidence snippets this label was derived from
    #[serde(default)]
    pub raw: Vec<serde_json::Value>,
    pub external_id: Option<String>,
    pub url: Option<String>,
    #[serde(flatten)]
    pub taxonomy: TaxonomyHints,
}

/// Result of one adapter lookup
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdapterOutput {
    pub labels: Vec<AdapterLabel>,
    pub notes: Vec<String>,
}

/// Per-call context handed to adapters
#[derive(Debug, Clone, Default)]
pub struct LookupContext {
    /// Response cache; `None` disables caching for the call
    pub cache: Option<FileCache>,
    /// Cancels in-flight HTTP requests when triggered
    pub cancel: Option<CancellationToken>,
}

impl LookupContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// One source's contribution to an aggregated label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContribution {
    pub source: String,
    pub confidence: Confidence,
    pub external_id: Option<String>,
    pub url: Option<String>,
}

/// Orchestrator's merged view of one slug across all sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedLabel {
    pub slug: String,
    pub name: String,
    pub kind: LabelKind,
    pub confidence: Confidence,
    #[serde(flatten)]
    pub taxonomy: TaxonomyHints,
    /// One entry per contributing source, in order of first contribution
    pub sources: Vec<SourceContribution>,
    /// Raw evidence keyed by source
    pub raw: BTreeMap<String, Vec<serde_json::Value>>,
}

impl AggregatedLabel {
    pub fn has_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s.source == source)
    }
}
