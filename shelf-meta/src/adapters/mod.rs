//! Source adapters
//!
//! Each adapter turns an [`AdapterInput`] into taxonomy candidates from one
//! bibliographic authority. All of them share the same fetch discipline:
//!
//! 1. Build [`QueryAttempt`]s, most specific first
//! 2. Check the source's cache namespace under the book's cache key
//! 3. On a miss: rate-limit, GET, retry transient failures, stop at the first
//!    attempt that returns anything
//! 4. Parse source-specific results into [`RawHeading`]s
//! 5. Resolve headings to slugs and merge same-slug hits within the call
//!
//! # Adapters
//! - **loc** - Library of Congress JSON search
//! - **fast** - OCLC FAST subject suggest
//! - **wikidata** - SPARQL over editions/works
//!
//! Ordinary lookup failures never surface as errors; they become notes on the
//! [`AdapterOutput`]. Only cache I/O trouble propagates.

pub mod fast;
pub mod loc;
pub mod query_attempts;
pub mod wikidata;

pub use fast::FastAdapter;
pub use loc::LocAdapter;
pub use query_attempts::{AttemptKind, QueryAttempt};
pub use wikidata::WikidataAdapter;

use crate::cache::{build_cache_key, CacheEntry};
use crate::config::SourceSettings;
use crate::error::{FetchError, MetaResult};
use crate::fetch::{FetchRequest, JsonFetcher};
use crate::slugs::{ResolveOptions, SlugResolution, SlugResolver};
use crate::types::{AdapterInput, AdapterLabel, AdapterOutput, LabelKind, LookupContext, TaxonomyHints};
use crate::utils::{retry_with_backoff, RateLimiter, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Uniform lookup contract for taxonomy sources
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source identifier (`loc`, `fast`, `wikidata`)
    fn id(&self) -> &str;

    /// Look up taxonomy candidates for one book
    ///
    /// # Errors
    /// Only cache I/O failures. Network and parse failures are reported as
    /// notes on the returned output.
    async fn lookup(&self, input: &AdapterInput, ctx: &LookupContext) -> MetaResult<AdapterOutput>;
}

// ============================================================================
// Rate-limited, retrying client
// ============================================================================

/// Outbound client for one source: owns that source's rate limiter
pub struct SourceClient {
    source: String,
    endpoint: String,
    user_agent: Option<String>,
    fetcher: Arc<dyn JsonFetcher>,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl SourceClient {
    pub fn new(
        source: &str,
        settings: &SourceSettings,
        fetcher: Arc<dyn JsonFetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source: source.to_string(),
            endpoint: settings.endpoint.clone(),
            user_agent: settings.user_agent.clone(),
            fetcher,
            rate_limiter: RateLimiter::new(settings.delay_ms, settings.jitter_ms),
            retry,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// GET request against the configured endpoint carrying this source's User-Agent
    pub fn request(&self) -> FetchRequest {
        self.request_to(self.endpoint.clone())
    }

    /// GET request against an arbitrary URL carrying this source's User-Agent
    pub fn request_to(&self, url: impl Into<String>) -> FetchRequest {
        FetchRequest::get(url).user_agent(self.user_agent.as_deref())
    }

    /// Rate-limited GET with retry on transient failures
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, FetchError> {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(FetchError::Cancelled);
        }

        let limiter = &self.rate_limiter;
        let fetcher = &self.fetcher;
        retry_with_backoff(&self.source, &self.retry, cancel, move || async move {
            limiter.wait().await;
            fetcher.get_json(request, cancel).await
        })
        .await
    }

    /// Run query attempts in order until one yields results.
    ///
    /// The outcome is read from and written to the source's cache namespace
    /// under the book's cache key. A result is written when an attempt found
    /// something, or when every attempt answered cleanly with nothing; a
    /// lookup with failed or cancelled attempts is left uncached.
    pub async fn search<B, P>(
        &self,
        input: &AdapterInput,
        attempts: &[QueryAttempt],
        ctx: &LookupContext,
        build_request: B,
        parse_results: P,
    ) -> MetaResult<SearchOutcome>
    where
        B: Fn(&QueryAttempt) -> FetchRequest,
        P: Fn(&Value) -> Vec<Value>,
    {
        let cache_key = build_cache_key(input);

        if let Some(cache) = &ctx.cache {
            if let Some(entry) = cache.read::<CachedSearch>(&self.source, &cache_key).await? {
                debug!(source = %self.source, key = %cache_key, "Using cached search");
                return Ok(SearchOutcome {
                    search: entry.data,
                    notes: Vec::new(),
                    from_cache: true,
                });
            }
        }

        let mut notes = Vec::new();
        let mut search = CachedSearch::default();
        let mut failed = false;
        let mut cancelled = false;

        for (index, attempt) in attempts.iter().enumerate() {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }

            let request = build_request(attempt);
            debug!(source = %self.source, kind = ?attempt.kind, query = %attempt.query, "Query attempt");

            match self.fetch(&request, ctx.cancel.as_ref()).await {
                Ok(body) => {
                    let results = parse_results(&body);
                    if results.is_empty() {
                        continue;
                    }
                    if index > 0 {
                        notes.push(format!(
                            "fallback {} query \"{}\" matched",
                            attempt_label(attempt.kind),
                            attempt.query
                        ));
                    }
                    search = CachedSearch {
                        attempt: Some(attempt.clone()),
                        fallback: index > 0,
                        results,
                    };
                    break;
                }
                Err(FetchError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        source = %self.source,
                        query = %attempt.query,
                        error = %e,
                        "Query attempt failed"
                    );
                    notes.push(format!(
                        "{} query \"{}\" failed: {}",
                        attempt_label(attempt.kind),
                        attempt.query,
                        e
                    ));
                    failed = true;
                }
            }
        }

        if cancelled {
            notes.push("lookup cancelled".to_string());
        }

        let definitive = search.attempt.is_some() || (!failed && !cancelled);
        if definitive {
            if let Some(cache) = &ctx.cache {
                cache
                    .write(&self.source, &cache_key, &CacheEntry::new(&search))
                    .await?;
            }
        }

        Ok(SearchOutcome {
            search,
            notes,
            from_cache: false,
        })
    }
}

fn attempt_label(kind: AttemptKind) -> &'static str {
    match kind {
        AttemptKind::Identifier => "identifier",
        AttemptKind::TitleAuthor => "title+author",
        AttemptKind::Title => "title",
        AttemptKind::MainTitle => "main title",
        AttemptKind::Bigram => "bigram",
        AttemptKind::Token => "token",
    }
}

/// Raw search outcome as stored in the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSearch {
    /// Attempt that produced `results`; `None` when nothing matched
    pub attempt: Option<QueryAttempt>,
    pub fallback: bool,
    pub results: Vec<Value>,
}

impl CachedSearch {
    /// Whether labels from this search deserve demoted confidence
    pub fn is_degraded(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.kind.is_degraded())
    }
}

/// Result of [`SourceClient::search`]
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub search: CachedSearch,
    pub notes: Vec<String>,
    pub from_cache: bool,
}

// ============================================================================
// Heading resolution
// ============================================================================

/// A subject heading as the source reported it, before slug resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeading {
    pub label: String,
    pub id: Option<String>,
    pub url: Option<String>,
    pub kind: LabelKind,
    pub raw: Value,
}

/// Resolve headings through the slug resolver and merge same-slug hits.
///
/// Duplicate headings (same label and id, ignoring case) are resolved once,
/// but every occurrence still reaches the collector so its raw evidence is
/// kept. Headings with no slug are dropped with one `unmatched subject` note.
pub fn resolve_headings(
    source: &str,
    resolver: &SlugResolver,
    strict: bool,
    degraded: bool,
    headings: Vec<RawHeading>,
) -> AdapterOutput {
    let options = ResolveOptions {
        strict,
        queue_review: true,
    };
    let mut resolved: HashMap<(String, Option<String>), Option<SlugResolution>> = HashMap::new();
    let mut collector = LabelCollector::default();
    let mut notes = Vec::new();

    for heading in headings {
        let label = heading.label.trim();
        if label.is_empty() {
            continue;
        }
        let dedup_key = (
            label.to_lowercase(),
            heading.id.as_deref().map(str::to_lowercase),
        );
        let resolution = match resolved.get(&dedup_key) {
            Some(cached) => cached.clone(),
            None => {
                let resolution = resolver.resolve_slug(source, label, heading.id.as_deref(), options);
                if resolution.is_none() {
                    debug!(source, label, "Unmatched subject");
                    notes.push(format!("unmatched subject \"{}\"", label));
                }
                resolved.insert(dedup_key, resolution.clone());
                resolution
            }
        };
        let Some(resolution) = resolution else {
            continue;
        };

        let confidence = if degraded {
            resolution.confidence().demote()
        } else {
            resolution.confidence()
        };

        collector.add(AdapterLabel {
            slug: resolution.slug,
            name: label.to_string(),
            source: source.to_string(),
            confidence,
            kind: heading.kind,
            raw: vec![heading.raw],
            external_id: heading.id,
            url: heading.url,
            taxonomy: TaxonomyHints::default(),
        });
    }

    AdapterOutput {
        labels: collector.into_labels(),
        notes,
    }
}

/// Within-call merge of labels by slug
#[derive(Debug, Default)]
pub struct LabelCollector {
    labels: Vec<AdapterLabel>,
    index: HashMap<String, usize>,
}

impl LabelCollector {
    /// Add a label, merging into an existing one with the same slug.
    ///
    /// A strictly higher confidence replaces name and kind; raw evidence is
    /// always appended and missing id/url filled in.
    pub fn add(&mut self, label: AdapterLabel) {
        let Some(i) = self.index.get(&label.slug).copied() else {
            self.index.insert(label.slug.clone(), self.labels.len());
            self.labels.push(label);
            return;
        };

        let existing = &mut self.labels[i];
        if label.confidence > existing.confidence {
            existing.confidence = label.confidence;
            existing.name = label.name;
            existing.kind = label.kind;
        }
        if existing.external_id.is_none() {
            existing.external_id = label.external_id;
        }
        if existing.url.is_none() {
            existing.url = label.url;
        }
        existing.raw.extend(label.raw);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn into_labels(self) -> Vec<AdapterLabel> {
        self.labels
    }
}

/// Extract string values from a field that may be a string, an array of
/// strings, or an array of objects carrying a `label`/`title`/`name`.
pub(crate) fn string_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => ["label", "title", "name"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Mock adapter for testing
// ============================================================================



#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::cache::FileCache;
    use crate::slugs::SubjectMappings;
    use crate::types::Confidence;
    use serde_json::json;

    fn client(fetcher: Arc<QueuedFetcher>) -> SourceClient {
        SourceClient::new("test", &settings("http://stub/search"), fetcher, RetryPolicy::none())
    }

    fn attempts() -> Vec<QueryAttempt> {
        vec![
            QueryAttempt::new(AttemptKind::Title, "The Way of Kings"),
            QueryAttempt::new(AttemptKind::Token, "kings"),
        ]
    }

    fn build(c: &SourceClient) -> impl Fn(&QueryAttempt) -> FetchRequest + '_ {
        move |a| c.request().param("q", a.query.clone())
    }

    fn parse(body: &Value) -> Vec<Value> {
        body["results"].as_array().cloned().unwrap_or_default()
    }

    fn input() -> AdapterInput {
        AdapterInput {
            title: Some("The Way of Kings".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_search_stops_at_first_hit_and_notes_fallback() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![
            Ok(json!({ "results": [] })),
            Ok(json!({ "results": [{ "subject": "x" }] })),
        ]));
        let c = client(Arc::clone(&fetcher));

        let outcome = c
            .search(&input(), &attempts(), &LookupContext::default(), build(&c), parse)
            .await
            .unwrap();

        assert_eq!(outcome.search.results.len(), 1);
        assert!(outcome.search.fallback);
        assert!(outcome.search.is_degraded());
        assert_eq!(outcome.notes, vec!["fallback token query \"kings\" matched".to_string()]);
        assert_eq!(fetcher.queries("q"), vec!["The Way of Kings", "kings"]);
    }

    #[tokio::test]
    async fn test_failures_become_notes_and_skip_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let ctx = LookupContext {
            cache: Some(cache.clone()),
            cancel: None,
        };
        let fetcher = Arc::new(QueuedFetcher::new(vec![
            Err(FetchError::Http {
                status: 503,
                message: "unavailable".into(),
            }),
            Err(FetchError::Network("connection reset".into())),
        ]));
        let c = client(Arc::clone(&fetcher));

        let outcome = c.search(&input(), &attempts(), &ctx, build(&c), parse).await.unwrap();

        assert!(outcome.search.results.is_empty());
        assert_eq!(outcome.notes.len(), 2);
        assert!(outcome.notes[0].contains("503"));
        let cached = cache
            .read::<CachedSearch>("test", &build_cache_key(&input()))
            .await
            .unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_definitive_result_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = LookupContext {
            cache: Some(FileCache::new(dir.path())),
            cancel: None,
        };
        let fetcher = Arc::new(QueuedFetcher::new(vec![Ok(
            json!({ "results": [{ "subject": "x" }] }),
        )]));
        let c = client(Arc::clone(&fetcher));

        let first = c.search(&input(), &attempts(), &ctx, build(&c), parse).await.unwrap();
        let second = c.search(&input(), &attempts(), &ctx, build(&c), parse).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.search, second.search);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = LookupContext {
            cache: None,
            cancel: Some(token),
        };
        let fetcher = Arc::new(QueuedFetcher::default());
        let c = client(Arc::clone(&fetcher));

        let outcome = c.search(&input(), &attempts(), &ctx, build(&c), parse).await.unwrap();

        assert_eq!(outcome.notes, vec!["lookup cancelled".to_string()]);
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn test_resolve_headings_merges_and_notes() {
        let resolver = SlugResolver::new(
            Arc::new(
                SubjectMappings::default()
                    .with_label("loc", "fantasy fiction", "fantasy")
                    .with_label("loc", "fantasy", "fantasy"),
            ),
            None,
        );
        let heading = |label: &str| RawHeading {
            label: label.to_string(),
            id: None,
            url: None,
            kind: LabelKind::Genre,
            raw: json!(label),
        };

        let output = resolve_headings(
            "loc",
            &resolver,
            true,
            false,
            vec![
                heading("Fantasy fiction"),
                heading("fantasy fiction"),
                heading("Fantasy"),
                heading("Epic literature"),
                heading("Epic literature"),
            ],
        );

        assert_eq!(output.labels.len(), 1);
        assert_eq!(output.labels[0].slug, "fantasy");
        assert_eq!(output.labels[0].confidence, Confidence::High);
        // Repeated headings keep their evidence; the unmatched one is noted once
        assert_eq!(output.labels[0].raw.len(), 3);
        assert_eq!(output.notes, vec!["unmatched subject \"Epic literature\"".to_string()]);
    }

    #[test]
    fn test_degraded_search_demotes_confidence() {
        let resolver = SlugResolver::new(
            Arc::new(SubjectMappings::default().with_label("loc", "dragons", "dragons")),
            None,
        );
        let output = resolve_headings(
            "loc",
            &resolver,
            false,
            true,
            vec![
                RawHeading {
                    label: "Dragons".into(),
                    id: None,
                    url: None,
                    kind: LabelKind::Topic,
                    raw: json!("Dragons"),
                },
                RawHeading {
                    label: "Brand new".into(),
                    id: None,
                    url: None,
                    kind: LabelKind::Topic,
                    raw: json!("Brand new"),
                },
            ],
        );

        assert_eq!(output.labels[0].confidence, Confidence::Medium);
        assert_eq!(output.labels[1].slug, "brand-new");
        assert_eq!(output.labels[1].confidence, Confidence::Low);
    }

    #[test]
    fn test_collector_raises_confidence() {
        let mut collector = LabelCollector::default();
        let label = |name: &str, confidence| AdapterLabel {
            slug: "space-opera".into(),
            name: name.into(),
            source: "fast".into(),
            confidence,
            kind: LabelKind::Genre,
            raw: vec![json!(name)],
            external_id: None,
            url: None,
            taxonomy: TaxonomyHints::default(),
        };

        collector.add(label("space opera", Confidence::Medium));
        collector.add(label("Space Opera", Confidence::High));
        collector.add(label("space-opera", Confidence::Low));

        let labels = collector.into_labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Space Opera");
        assert_eq!(labels[0].confidence, Confidence::High);
        assert_eq!(labels[0].raw.len(), 3);
    }

    #[test]
    fn test_string_values_shapes() {
        assert_eq!(string_values(Some(&json!("a"))), vec!["a"]);
        assert_eq!(
            string_values(Some(&json!(["a", { "title": "b" }, 3]))),
            vec!["a", "b"]
        );
        assert!(string_values(None).is_empty());
    }
}
