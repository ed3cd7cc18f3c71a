//! Evidence harvest pass
//!
//! Collects descriptive evidence for one book (descriptions, subjects,
//! categories, facts) from OpenLibrary, Google Books, Wikipedia and Wikidata.
//! Unlike the taxonomy adapters these clients do no slug resolution; their
//! output feeds downstream enrichment (cross-tagging, descriptions).
//!
//! Each client owns a rate limiter and caches its mapped evidence under its
//! own namespace, keyed by the book's cache key. `force` skips cache reads but
//! still writes fresh results. Client failures become notes.

pub mod google_books;
pub mod openlibrary;
pub mod wikidata_facts;
pub mod wikipedia;

pub use google_books::{GoogleBooksClient, GoogleBooksEvidence};
pub use openlibrary::{OpenLibraryClient, OpenLibraryEvidence};
pub use wikidata_facts::{WikidataFacts, WikidataFactsClient};
pub use wikipedia::{WikipediaClient, WikipediaEvidence};

use crate::cache::{build_cache_key, CacheEntry, FileCache};
use crate::error::{FetchError, MetaResult};
use crate::types::AdapterInput;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-call harvest switches
#[derive(Debug, Clone, Default)]
pub struct HarvestContext {
    pub cache: Option<FileCache>,
    pub cancel: Option<CancellationToken>,
    /// Ignore cached evidence (fresh results are still written)
    pub force: bool,
}

impl HarvestContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Everything harvested for one book
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    pub cache_key: String,
    pub openlibrary: Option<OpenLibraryEvidence>,
    pub google_books: Option<GoogleBooksEvidence>,
    pub wikipedia: Option<WikipediaEvidence>,
    pub wikidata: Option<WikidataFacts>,
    /// Notes keyed by client namespace
    pub notes: BTreeMap<String, Vec<String>>,
}

impl EvidenceBundle {
    /// Non-empty descriptions, most curated source first
    pub fn descriptions(&self) -> Vec<&str> {
        [
            self.google_books.as_ref().and_then(|e| e.description.as_deref()),
            self.openlibrary.as_ref().and_then(|e| e.description.as_deref()),
            self.wikipedia.as_ref().and_then(|e| e.extract.as_deref()),
            self.wikidata.as_ref().and_then(|e| e.description.as_deref()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect()
    }

    /// Subject-like strings from every client, deduplicated case-insensitively
    pub fn subjects(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let openlibrary = self.openlibrary.iter().flat_map(|e| e.subjects.iter());
        let google = self.google_books.iter().flat_map(|e| e.categories.iter());
        let wikipedia = self.wikipedia.iter().flat_map(|e| e.categories.iter());
        let wikidata = self
            .wikidata
            .iter()
            .flat_map(|e| ["genre", "main subject"].into_iter().flat_map(move |k| e.facts.get(k)))
            .flatten();

        openlibrary
            .chain(google)
            .chain(wikipedia)
            .chain(wikidata)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
            .map(str::to_string)
            .collect()
    }

    fn note(&mut self, namespace: &str, notes: Vec<String>) {
        if !notes.is_empty() {
            self.notes.entry(namespace.to_string()).or_default().extend(notes);
        }
    }
}

/// Result of one client's harvest
#[derive(Debug, Clone)]
pub struct Harvested<T> {
    pub evidence: Option<T>,
    pub notes: Vec<String>,
}

/// Runs every harvest client in sequence for one book
pub struct EvidenceHarvester {
    pub openlibrary: OpenLibraryClient,
    pub google_books: GoogleBooksClient,
    pub wikipedia: WikipediaClient,
    pub wikidata: WikidataFactsClient,
}

impl EvidenceHarvester {
    pub async fn harvest(&self, input: &AdapterInput, ctx: &HarvestContext) -> MetaResult<EvidenceBundle> {
        let mut bundle = EvidenceBundle {
            cache_key: build_cache_key(input),
            ..Default::default()
        };

        if !input.is_meaningful() {
            bundle.note("harvest", vec!["skipped: no ISBN or title".to_string()]);
            return Ok(bundle);
        }

        debug!(key = %bundle.cache_key, force = ctx.force, "Harvesting evidence");

        let found = self.openlibrary.harvest(input, ctx).await?;
        bundle.openlibrary = found.evidence;
        bundle.note(openlibrary::NAMESPACE, found.notes);

        if cancelled(ctx, &mut bundle) {
            return Ok(bundle);
        }
        let found = self.google_books.harvest(input, ctx).await?;
        bundle.google_books = found.evidence;
        bundle.note(google_books::NAMESPACE, found.notes);

        if cancelled(ctx, &mut bundle) {
            return Ok(bundle);
        }
        // Prefer the canonical title found by the catalog clients
        let title_hint = bundle
            .openlibrary
            .as_ref()
            .and_then(|e| e.title.clone())
            .or_else(|| bundle.google_books.as_ref().and_then(|e| e.title.clone()));
        let found = self.wikipedia.harvest(input, title_hint.as_deref(), ctx).await?;
        bundle.wikipedia = found.evidence;
        bundle.note(wikipedia::NAMESPACE, found.notes);

        if cancelled(ctx, &mut bundle) {
            return Ok(bundle);
        }
        let found = self.wikidata.harvest(input, ctx).await?;
        bundle.wikidata = found.evidence;
        bundle.note(wikidata_facts::NAMESPACE, found.notes);

        Ok(bundle)
    }
}

fn cancelled(ctx: &HarvestContext, bundle: &mut EvidenceBundle) -> bool {
    if ctx.is_cancelled() {
        bundle.note("harvest", vec!["harvest cancelled".to_string()]);
        return true;
    }
    false
}

/// Read-through cache around one client's fetch.
///
/// `Ok(Ok(None))` is a definitive "not found" and is cached like a hit;
/// fetch errors are returned uncached.
pub(crate) async fn cached_fetch<T, F, Fut>(
    namespace: &str,
    input: &AdapterInput,
    ctx: &HarvestContext,
    fetch: F,
) -> MetaResult<Result<Option<T>, FetchError>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, FetchError>>,
{
    let key = build_cache_key(input);

    if let (Some(cache), false) = (&ctx.cache, ctx.force) {
        if let Some(entry) = cache.read::<Option<T>>(namespace, &key).await? {
            return Ok(Ok(entry.data));
        }
    }

    match fetch().await {
        Ok(evidence) => {
            if let Some(cache) = &ctx.cache {
                cache.write(namespace, &key, &CacheEntry::new(&evidence)).await?;
            }
            Ok(Ok(evidence))
        }
        Err(e) => {
            warn!(source = namespace, key = %key, error = %e, "Harvest fetch failed");
            Ok(Err(e))
        }
    }
}

/// Collapse a fetch result into evidence plus notes
pub(crate) fn into_harvested<T>(namespace: &str, result: Result<Option<T>, FetchError>) -> Harvested<T> {
    match result {
        Ok(Some(evidence)) => Harvested {
            evidence: Some(evidence),
            notes: Vec::new(),
        },
        Ok(None) => Harvested {
            evidence: None,
            notes: vec![format!("{}: no match", namespace)],
        },
        Err(FetchError::Cancelled) => Harvested {
            evidence: None,
            notes: vec![format!("{}: cancelled", namespace)],
        },
        Err(e) => Harvested {
            evidence: None,
            notes: vec![format!("{}: {}", namespace, e)],
        },
    }
}

/// Treat HTTP 404 as "not found" rather than a failure
pub(crate) fn not_found_as_none(result: Result<Value, FetchError>) -> Result<Option<Value>, FetchError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(FetchError::Http { status: 404, .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// String or `{ "value": string }` (OpenLibrary descriptions use both)
pub(crate) fn text_value(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("value")?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Array of strings (non-strings skipped)
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
