//! Library of Congress adapter
//!
//! Queries the loc.gov JSON search API and maps LCSH subject and genre
//! headings to taxonomy slugs. LoC has no structured kind field, so the kind
//! of each heading is inferred from its text.

use super::query_attempts::{dedup_attempts, title_attempts, AttemptKind, QueryAttempt};
use super::{resolve_headings, string_values, RawHeading, SourceAdapter, SourceClient};
use crate::config::SourceSettings;
use crate::error::MetaResult;
use crate::fetch::JsonFetcher;
use crate::slugs::SlugResolver;
use crate::types::{AdapterInput, AdapterOutput, LabelKind, LookupContext};
use crate::utils::RetryPolicy;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const SOURCE_ID: &str = "loc";
pub const DEFAULT_ENDPOINT: &str = "https://www.loc.gov/books/";

/// Results requested per query
const PAGE_SIZE: &str = "10";

static AUDIENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(juvenile|young adult|children's|teen|picture books?)\b").expect("valid regex")
});
static FORMAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(comic books, strips|graphic novels?|audiobooks?|large type books|short stories|anthologies)\b")
        .expect("valid regex")
});
/// "Surname, Forenames, 1892-1973" or a fictitious character
static PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^[^,\d]+,\s*[^,\d][^,]*,.*\b\d{3,4}-|\(fictitious character\))").expect("valid regex")
});
/// Imaginary places, centuries and period subdivisions ("World War, 1939-1945")
static SETTING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\(imaginary place\)|\b\d{1,2}(st|nd|rd|th) century\b|,\s*\d{3,4}-\d{3,4}$)")
        .expect("valid regex")
});
static PLACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([A-Z][A-Za-z .]*\)$").expect("valid regex"));
static GENRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fiction|novels|stories|romances?|fantasy|poetry|drama)$").expect("valid regex")
});

/// Library of Congress subject adapter
pub struct LocAdapter {
    client: SourceClient,
    resolver: SlugResolver,
    strict: bool,
}

impl LocAdapter {
    pub fn new(
        settings: &SourceSettings,
        fetcher: Arc<dyn JsonFetcher>,
        resolver: SlugResolver,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: SourceClient::new(SOURCE_ID, settings, fetcher, retry),
            resolver,
            strict: settings.strict,
        }
    }

    /// ISBN attempts first, then the title relaxations
    fn attempts(input: &AdapterInput) -> Vec<QueryAttempt> {
        let mut attempts: Vec<QueryAttempt> = [input.isbn13(), input.isbn10()]
            .into_iter()
            .flatten()
            .map(|isbn| QueryAttempt::new(AttemptKind::Identifier, isbn))
            .collect();
        attempts.extend(title_attempts(input));
        dedup_attempts(attempts)
    }
}

#[async_trait]
impl SourceAdapter for LocAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn lookup(&self, input: &AdapterInput, ctx: &LookupContext) -> MetaResult<AdapterOutput> {
        let attempts = Self::attempts(input);
        if attempts.is_empty() {
            return Ok(AdapterOutput {
                labels: Vec::new(),
                notes: vec!["skipped: no ISBN or title".to_string()],
            });
        }

        let outcome = self
            .client
            .search(
                input,
                &attempts,
                ctx,
                |attempt| {
                    self.client
                        .request()
                        .param("q", attempt.query.clone())
                        .param("all", "true")
                        .param("fo", "json")
                        .param("c", PAGE_SIZE)
                },
                parse_results,
            )
            .await?;

        let headings: Vec<RawHeading> = outcome
            .search
            .results
            .iter()
            .flat_map(extract_headings)
            .collect();
        debug!(source = SOURCE_ID, headings = headings.len(), "Parsed LoC headings");

        let mut output = resolve_headings(
            SOURCE_ID,
            &self.resolver,
            self.strict,
            outcome.search.is_degraded(),
            headings,
        );
        let mut notes = outcome.notes;
        notes.append(&mut output.notes);
        output.notes = notes;
        Ok(output)
    }
}

fn parse_results(body: &Value) -> Vec<Value> {
    body.get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Subject and genre headings from one search result
fn extract_headings(result: &Value) -> Vec<RawHeading> {
    let item_url = result
        .get("id")
        .or_else(|| result.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let item = result.get("item");

    let subjects = [
        result.get("subjects"),
        result.get("subject_headings"),
        item.and_then(|i| i.get("subjects")),
        item.and_then(|i| i.get("subject")),
    ]
    .into_iter()
    .flat_map(string_values)
    .map(|h| (h, None));

    let genres = [result.get("genre_headings"), item.and_then(|i| i.get("genre"))]
        .into_iter()
        .flat_map(string_values)
        .map(|h| (h, Some(LabelKind::Genre)));

    let mut seen = std::collections::HashSet::new();
    subjects
        .chain(genres)
        .filter_map(|(heading, hint)| {
            let label = clean_heading(&heading);
            if label.is_empty() || !seen.insert(label.to_lowercase()) {
                return None;
            }
            let kind = infer_kind(&label, hint);
            Some(RawHeading {
                raw: json!({ "heading": heading, "item": item_url }),
                label,
                id: None,
                url: item_url.clone(),
                kind,
            })
        })
        .collect()
}

/// Trim whitespace and the cataloguer's trailing period
fn clean_heading(heading: &str) -> String {
    heading.trim().trim_end_matches('.').trim().to_string()
}

/// Infer a heading's kind from its text; `hint` applies when no stronger rule matches
pub fn infer_kind(heading: &str, hint: Option<LabelKind>) -> LabelKind {
    if AUDIENCE_RE.is_match(heading) {
        LabelKind::Audience
    } else if FORMAT_RE.is_match(heading) {
        LabelKind::Format
    } else if PERSON_RE.is_match(heading) {
        LabelKind::Person
    } else if SETTING_RE.is_match(heading) {
        LabelKind::Setting
    } else if let Some(hint) = hint {
        hint
    } else if PLACE_RE.is_match(heading) {
        LabelKind::Place
    } else if GENRE_RE.is_match(heading) {
        LabelKind::Genre
    } else {
        LabelKind::Topic
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::slugs::SubjectMappings;
    use crate::types::Confidence;

    fn adapter(fetcher: Arc<QueuedFetcher>, mappings: SubjectMappings) -> LocAdapter {
        LocAdapter::new(
            &settings(DEFAULT_ENDPOINT),
            fetcher,
            SlugResolver::new(Arc::new(mappings), None),
            RetryPolicy::none(),
        )
    }

    fn way_of_kings() -> AdapterInput {
        AdapterInput {
            isbn13: Some("9780765326355".into()),
            title: Some("The Way of Kings".into()),
            authors: vec!["Brandon Sanderson".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_infer_kind_rules() {
        assert_eq!(infer_kind("Fantasy fiction", None), LabelKind::Genre);
        assert_eq!(infer_kind("Juvenile fiction", None), LabelKind::Audience);
        assert_eq!(infer_kind("Graphic novels", None), LabelKind::Format);
        assert_eq!(infer_kind("Tolkien, J. R. R. (John Ronald Reuel), 1892-1973", None), LabelKind::Person);
        assert_eq!(infer_kind("Holmes, Sherlock (Fictitious character)", None), LabelKind::Person);
        assert_eq!(infer_kind("Sanderson, Brandon, 1975-", None), LabelKind::Person);
        assert_eq!(infer_kind("World War, 1939-1945", None), LabelKind::Setting);
        assert_eq!(
            infer_kind("United States -- History -- Civil War, 1861-1865", None),
            LabelKind::Setting
        );
        assert_eq!(infer_kind("Roshar (Imaginary place)", None), LabelKind::Setting);
        assert_eq!(infer_kind("London (England)", None), LabelKind::Place);
        assert_eq!(infer_kind("Dragons", None), LabelKind::Topic);
        assert_eq!(infer_kind("Dragons", Some(LabelKind::Genre)), LabelKind::Genre);
    }

    #[test]
    fn test_extract_headings_shapes() {
        let result = json!({
            "id": "http://www.loc.gov/item/2010024584/",
            "subject_headings": ["Fantasy fiction.", "Epic literature"],
            "genre_headings": "Fantasy fiction",
            "item": { "subjects": ["Dragons"] }
        });

        let headings = extract_headings(&result);
        let labels: Vec<&str> = headings.iter().map(|h| h.label.as_str()).collect();
        assert_eq!(labels, vec!["Fantasy fiction", "Epic literature", "Dragons"]);
        assert_eq!(headings[0].url.as_deref(), Some("http://www.loc.gov/item/2010024584/"));
    }

    #[test]
    fn test_attempt_order() {
        let attempts = LocAdapter::attempts(&way_of_kings());
        assert_eq!(attempts[0], QueryAttempt::new(AttemptKind::Identifier, "9780765326355"));
        assert_eq!(attempts[1].kind, AttemptKind::TitleAuthor);
    }

    #[tokio::test]
    async fn test_lookup_resolves_and_reports_unmatched() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![Ok(json!({
            "results": [{ "id": "item-1", "subjects": ["Fantasy fiction", "Epic literature"] }]
        }))]));
        let loc = adapter(
            Arc::clone(&fetcher),
            SubjectMappings::default().with_label("loc", "fantasy fiction", "fantasy"),
        );

        let output = loc.lookup(&way_of_kings(), &LookupContext::default()).await.unwrap();

        assert_eq!(output.labels.len(), 1);
        assert_eq!(output.labels[0].slug, "fantasy");
        assert_eq!(output.labels[0].confidence, Confidence::High);
        assert_eq!(output.labels[0].kind, LabelKind::Genre);
        assert_eq!(output.notes, vec!["unmatched subject \"Epic literature\"".to_string()]);

        let request = &fetcher.requests.lock().unwrap()[0];
        assert_eq!(request.query_value("q"), Some("9780765326355"));
        assert_eq!(request.query_value("fo"), Some("json"));
        assert_eq!(request.query_value("c"), Some("10"));
    }

    #[tokio::test]
    async fn test_repeated_subject_keeps_every_item() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![Ok(json!({
            "results": [
                { "id": "item-1", "subjects": ["Fantasy fiction"] },
                { "id": "item-2", "subjects": ["Fantasy fiction."] }
            ]
        }))]));
        let loc = adapter(
            Arc::clone(&fetcher),
            SubjectMappings::default().with_label("loc", "fantasy fiction", "fantasy"),
        );

        let output = loc.lookup(&way_of_kings(), &LookupContext::default()).await.unwrap();

        assert_eq!(output.labels.len(), 1);
        let fantasy = &output.labels[0];
        assert_eq!(fantasy.url.as_deref(), Some("item-1"));
        let items: Vec<&str> = fantasy.raw.iter().filter_map(|r| r["item"].as_str()).collect();
        assert_eq!(items, vec!["item-1", "item-2"]);
        assert!(output.notes.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_without_keys_is_skipped() {
        let fetcher = Arc::new(QueuedFetcher::default());
        let loc = adapter(Arc::clone(&fetcher), SubjectMappings::default());

        let output = loc
            .lookup(&AdapterInput::default(), &LookupContext::default())
            .await
            .unwrap();

        assert!(output.labels.is_empty());
        assert_eq!(output.notes.len(), 1);
        assert_eq!(fetcher.request_count(), 0);
    }
}
