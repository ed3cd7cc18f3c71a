//! OpenLibrary harvest client
//!
//! Edition by ISBN (`/isbn/{isbn}.json`), falling back to a title/author
//! search (`/search.json`), then the linked work (`/works/{key}.json`) for
//! description and subject facets.

use super::{cached_fetch, into_harvested, not_found_as_none, string_list, text_value, HarvestContext, Harvested};
use crate::adapters::SourceClient;
use crate::config::SourceSettings;
use crate::error::{FetchError, MetaResult};
use crate::fetch::JsonFetcher;
use crate::types::AdapterInput;
use crate::utils::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const NAMESPACE: &str = "openlibrary";
pub const DEFAULT_ENDPOINT: &str = "https://openlibrary.org";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLibraryEvidence {
    pub edition_key: Option<String>,
    pub work_key: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub first_publish_date: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub subject_places: Vec<String>,
    #[serde(default)]
    pub subject_times: Vec<String>,
    #[serde(default)]
    pub subject_people: Vec<String>,
}

pub struct OpenLibraryClient {
    client: SourceClient,
}

impl OpenLibraryClient {
    pub fn new(settings: &SourceSettings, fetcher: Arc<dyn JsonFetcher>, retry: RetryPolicy) -> Self {
        Self {
            client: SourceClient::new(NAMESPACE, settings, fetcher, retry),
        }
    }

    pub async fn harvest(&self, input: &AdapterInput, ctx: &HarvestContext) -> MetaResult<Harvested<OpenLibraryEvidence>> {
        let result = cached_fetch(NAMESPACE, input, ctx, move || {
            self.fetch_evidence(input, ctx.cancel.as_ref())
        })
        .await?;
        Ok(into_harvested(NAMESPACE, result))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.client.endpoint().trim_end_matches('/'), path)
    }

    async fn fetch_evidence(
        &self,
        input: &AdapterInput,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<OpenLibraryEvidence>, FetchError> {
        let mut evidence = OpenLibraryEvidence::default();
        let mut found = false;

        for isbn in [input.isbn13(), input.isbn10()].into_iter().flatten() {
            let request = self.client.request_to(self.url(&format!("/isbn/{}.json", isbn)));
            if let Some(edition) = not_found_as_none(self.client.fetch(&request, cancel).await)? {
                apply_edition(&mut evidence, &edition);
                found = true;
                break;
            }
            debug!(isbn = %isbn, "OpenLibrary has no edition for ISBN");
        }

        if !found {
            if let Some(title) = input.title() {
                let mut request = self
                    .client
                    .request_to(self.url("/search.json"))
                    .param("title", title)
                    .param("limit", "1")
                    .param("fields", "key,title,first_publish_year,subject");
                if let Some(author) = input.authors().next() {
                    request = request.param("author", author);
                }
                let body = self.client.fetch(&request, cancel).await?;
                if let Some(doc) = body.pointer("/docs/0") {
                    apply_search_doc(&mut evidence, doc);
                    found = true;
                }
            }
        }

        if !found {
            return Ok(None);
        }

        if let Some(work_key) = evidence.work_key.clone() {
            let request = self.client.request_to(self.url(&format!("{}.json", work_key)));
            if let Some(work) = not_found_as_none(self.client.fetch(&request, cancel).await)? {
                apply_work(&mut evidence, &work);
            }
        }

        Ok(Some(evidence))
    }
}

fn apply_edition(evidence: &mut OpenLibraryEvidence, edition: &Value) {
    evidence.edition_key = edition.get("key").and_then(Value::as_str).map(str::to_string);
    evidence.title = edition.get("title").and_then(Value::as_str).map(str::to_string);
    evidence.description = text_value(edition.get("description"));
    evidence.work_key = edition
        .pointer("/works/0/key")
        .and_then(Value::as_str)
        .map(str::to_string);
    merge_unique(&mut evidence.subjects, string_list(edition.get("subjects")));
}

fn apply_search_doc(evidence: &mut OpenLibraryEvidence, doc: &Value) {
    evidence.work_key = doc.get("key").and_then(Value::as_str).map(str::to_string);
    evidence.title = doc.get("title").and_then(Value::as_str).map(str::to_string);
    evidence.first_publish_date = doc.get("first_publish_year").map(|y| match y {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    merge_unique(&mut evidence.subjects, string_list(doc.get("subject")));
}

/// Work-level data wins for description; subject facets are unioned
fn apply_work(evidence: &mut OpenLibraryEvidence, work: &Value) {
    if let Some(description) = text_value(work.get("description")) {
        evidence.description = Some(description);
    }
    if evidence.title.is_none() {
        evidence.title = work.get("title").and_then(Value::as_str).map(str::to_string);
    }
    if let Some(date) = work.get("first_publish_date").and_then(Value::as_str) {
        evidence.first_publish_date = Some(date.to_string());
    }
    merge_unique(&mut evidence.subjects, string_list(work.get("subjects")));
    merge_unique(&mut evidence.subject_places, string_list(work.get("subject_places")));
    merge_unique(&mut evidence.subject_times, string_list(work.get("subject_times")));
    merge_unique(&mut evidence.subject_people, string_list(work.get("subject_people")));
}

fn merge_unique(target: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !target.iter().any(|t| t.eq_ignore_ascii_case(&value)) {
            target.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{settings, QueuedFetcher};
    use serde_json::json;

    fn client(fetcher: Arc<QueuedFetcher>) -> OpenLibraryClient {
        OpenLibraryClient::new(&settings(DEFAULT_ENDPOINT), fetcher, RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_edition_then_work() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![
            Ok(json!({
                "key": "/books/OL24381202M",
                "title": "The Way of Kings",
                "works": [{ "key": "/works/OL15358691W" }],
                "subjects": ["Fantasy fiction"]
            })),
            Ok(json!({
                "description": { "type": "/type/text", "value": "Roshar is a world of stone and storms." },
                "subjects": ["fantasy fiction", "Magic"],
                "subject_places": ["Roshar"]
            })),
        ]));
        let ol = client(Arc::clone(&fetcher));
        let input = AdapterInput {
            isbn13: Some("9780765326355".into()),
            ..Default::default()
        };

        let harvested = ol.harvest(&input, &HarvestContext::default()).await.unwrap();
        let evidence = harvested.evidence.unwrap();

        assert_eq!(evidence.work_key.as_deref(), Some("/works/OL15358691W"));
        assert_eq!(evidence.description.as_deref(), Some("Roshar is a world of stone and storms."));
        assert_eq!(evidence.subjects, vec!["Fantasy fiction", "Magic"]);
        assert_eq!(evidence.subject_places, vec!["Roshar"]);
        assert!(harvested.notes.is_empty());

        let urls: Vec<String> = fetcher.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "https://openlibrary.org/isbn/9780765326355.json",
                "https://openlibrary.org/works/OL15358691W.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_isbn_falls_back_to_search() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![
            Err(FetchError::Http {
                status: 404,
                message: "Not Found".into(),
            }),
            Ok(json!({ "docs": [{ "key": "/works/OL1W", "title": "Dune", "first_publish_year": 1965 }] })),
            Ok(json!({ "description": "Spice." })),
        ]));
        let ol = client(Arc::clone(&fetcher));
        let input = AdapterInput {
            isbn13: Some("9780441172719".into()),
            title: Some("Dune".into()),
            authors: vec!["Frank Herbert".into()],
            ..Default::default()
        };

        let evidence = ol
            .harvest(&input, &HarvestContext::default())
            .await
            .unwrap()
            .evidence
            .unwrap();

        assert_eq!(evidence.title.as_deref(), Some("Dune"));
        assert_eq!(evidence.first_publish_date.as_deref(), Some("1965"));
        assert_eq!(evidence.description.as_deref(), Some("Spice."));
        assert_eq!(fetcher.queries("author"), vec!["Frank Herbert"]);
    }

    #[tokio::test]
    async fn test_no_match_is_a_note() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![Ok(json!({ "docs": [] }))]));
        let ol = client(fetcher);
        let input = AdapterInput {
            title: Some("Nonexistent".into()),
            ..Default::default()
        };

        let harvested = ol.harvest(&input, &HarvestContext::default()).await.unwrap();
        assert!(harvested.evidence.is_none());
        assert_eq!(harvested.notes, vec!["openlibrary: no match".to_string()]);
    }
}
