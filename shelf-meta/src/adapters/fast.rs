//! OCLC FAST adapter
//!
//! Uses the FAST suggest service (`autoSubject` index) to map title text to
//! FAST subject authorities. Kind comes from the authority's MARC tag.

use super::query_attempts::title_attempts;
use super::{resolve_headings, RawHeading, SourceAdapter, SourceClient};
use crate::config::SourceSettings;
use crate::error::MetaResult;
use crate::fetch::JsonFetcher;
use crate::slugs::SlugResolver;
use crate::types::{AdapterInput, AdapterOutput, LabelKind, LookupContext};
use crate::utils::RetryPolicy;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SOURCE_ID: &str = "fast";
pub const DEFAULT_ENDPOINT: &str = "https://fast.oclc.org/searchfast/fastsuggest";
pub const DEFAULT_MAX_SUGGESTIONS: u32 = 20;

const FAST_URI_BASE: &str = "http://id.worldcat.org/fast/";

/// FAST subject suggest adapter
pub struct FastAdapter {
    client: SourceClient,
    resolver: SlugResolver,
    strict: bool,
    api_key: Option<String>,
    max_suggestions: u32,
}

impl FastAdapter {
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
            api_key: None,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    /// Authenticate requests; `None` keeps them anonymous
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_max_suggestions(mut self, max_suggestions: u32) -> Self {
        self.max_suggestions = max_suggestions.max(1);
        self
    }
}

#[async_trait]
impl SourceAdapter for FastAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn lookup(&self, input: &AdapterInput, ctx: &LookupContext) -> MetaResult<AdapterOutput> {
        let attempts = title_attempts(input);
        if attempts.is_empty() {
            return Ok(AdapterOutput {
                labels: Vec::new(),
                notes: vec!["skipped: no title".to_string()],
            });
        }

        let rows = self.max_suggestions.to_string();
        let outcome = self
            .client
            .search(
                input,
                &attempts,
                ctx,
                |attempt| {
                    let request = self
                        .client
                        .request()
                        .param("query", attempt.query.clone())
                        .param("queryIndex", "suggestall")
                        .param("queryReturn", "auth,idroot,type,tag,score")
                        .param("suggest", "autoSubject")
                        .param("rows", rows.clone())
                        .param("wt", "json");
                    match &self.api_key {
                        Some(key) => request.param("apikey", key.clone()),
                        None => request,
                    }
                },
                parse_docs,
            )
            .await?;

        let headings = outcome.search.results.iter().filter_map(heading_from_doc).collect();
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

fn parse_docs(body: &Value) -> Vec<Value> {
    body.pointer("/response/docs")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn first_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn heading_from_doc(doc: &Value) -> Option<RawHeading> {
    let label = first_string(doc.get("auth"))
        .or_else(|| first_string(doc.get("suggestall")))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())?;

    let id = first_string(doc.get("idroot")).or_else(|| first_string(doc.get("id")));
    let url = id.as_deref().and_then(fast_uri);
    let tag = first_string(doc.get("tag"));
    let kind = kind_from_tag(tag.as_deref(), first_string(doc.get("type")).as_deref());

    Some(RawHeading {
        label,
        id,
        url,
        kind,
        raw: json!({
            "auth": doc.get("auth"),
            "idroot": doc.get("idroot"),
            "tag": doc.get("tag"),
            "type": doc.get("type"),
            "score": doc.get("score"),
        }),
    })
}

/// `fst01423787` → `http://id.worldcat.org/fast/1423787`
pub fn fast_uri(id: &str) -> Option<String> {
    let digits: String = id.chars().filter(char::is_ascii_digit).collect();
    let numeric = digits.trim_start_matches('0');
    if numeric.is_empty() {
        return None;
    }
    Some(format!("{}{}", FAST_URI_BASE, numeric))
}

/// Map a FAST MARC authority tag (or the type text) to a label kind
pub fn kind_from_tag(tag: Option<&str>, type_text: Option<&str>) -> LabelKind {
    match tag.map(str::trim) {
        Some("100") => return LabelKind::Person,
        Some("151") => return LabelKind::Place,
        Some("155") => return LabelKind::Genre,
        Some("148") => return LabelKind::Setting,
        Some("150") | Some("110") | Some("111") | Some("130") | Some("147") => return LabelKind::Topic,
        _ => {}
    }

    let type_text = type_text.unwrap_or_default().to_lowercase();
    if type_text.contains("personal") {
        LabelKind::Person
    } else if type_text.contains("geographic") {
        LabelKind::Place
    } else if type_text.contains("form") || type_text.contains("genre") {
        LabelKind::Genre
    } else if type_text.contains("chronological") {
        LabelKind::Setting
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

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(kind_from_tag(Some("155"), None), LabelKind::Genre);
        assert_eq!(kind_from_tag(Some("100"), Some("auth")), LabelKind::Person);
        assert_eq!(kind_from_tag(Some("151"), None), LabelKind::Place);
        assert_eq!(kind_from_tag(Some("150"), None), LabelKind::Topic);
        assert_eq!(kind_from_tag(None, Some("Geographic Name")), LabelKind::Place);
        assert_eq!(kind_from_tag(None, None), LabelKind::Topic);
    }

    #[test]
    fn test_fast_uri() {
        assert_eq!(
            fast_uri("fst01423787").as_deref(),
            Some("http://id.worldcat.org/fast/1423787")
        );
        assert_eq!(fast_uri("fst"), None);
    }

    #[test]
    fn test_heading_from_doc_variants() {
        let doc = json!({ "suggestall": ["Space opera"], "idroot": "fst01128373", "tag": 155 });
        let heading = heading_from_doc(&doc).unwrap();
        assert_eq!(heading.label, "Space opera");
        assert_eq!(heading.kind, LabelKind::Genre);
        assert_eq!(heading.url.as_deref(), Some("http://id.worldcat.org/fast/1128373"));

        assert!(heading_from_doc(&json!({ "idroot": "fst1" })).is_none());
    }

    #[tokio::test]
    async fn test_lookup_builds_suggest_request_and_matches_ids() {
        let fetcher = Arc::new(QueuedFetcher::new(vec![Ok(json!({
            "response": { "docs": [
                { "auth": "Fantasy fiction", "idroot": "fst01423787", "tag": 155, "type": "auth", "score": 90 },
                { "auth": "Kings and rulers", "idroot": "fst00987654", "tag": 150, "type": "auth" }
            ] }
        }))]));
        let fast = FastAdapter::new(
            &settings(DEFAULT_ENDPOINT),
            fetcher.clone(),
            SlugResolver::new(
                Arc::new(SubjectMappings::default().with_id("fast", "fst01423787", "fantasy")),
                None,
            ),
            RetryPolicy::none(),
        )
        .with_api_key(Some("secret".into()))
        .with_max_suggestions(5);

        let input = AdapterInput {
            title: Some("The Way of Kings".into()),
            authors: vec!["Brandon Sanderson".into()],
            ..Default::default()
        };
        let output = fast.lookup(&input, &LookupContext::default()).await.unwrap();

        assert_eq!(output.labels.len(), 1);
        assert_eq!(output.labels[0].slug, "fantasy");
        assert_eq!(output.labels[0].confidence, Confidence::High);
        assert_eq!(output.labels[0].external_id.as_deref(), Some("fst01423787"));
        assert_eq!(output.notes, vec!["unmatched subject \"Kings and rulers\"".to_string()]);

        let request = &fetcher.requests.lock().unwrap()[0];
        assert_eq!(request.query_value("query"), Some("The Way of Kings Brandon Sanderson"));
        assert_eq!(request.query_value("suggest"), Some("autoSubject"));
        assert_eq!(request.query_value("rows"), Some("5"));
        assert_eq!(request.query_value("apikey"), Some("secret"));
    }
}
