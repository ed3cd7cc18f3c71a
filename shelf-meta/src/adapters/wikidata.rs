//! Wikidata adapter
//!
//! Finds the book's work item over SPARQL and reads its genres (P136), main
//! subjects (P921) and narrative locations (P840). The SPARQL variable that
//! bound a value decides its kind.

use super::query_attempts::{dedup_attempts, title_attempts, AttemptKind, QueryAttempt};
use super::{resolve_headings, RawHeading, SourceAdapter, SourceClient};
use crate::config::SourceSettings;
use crate::error::MetaResult;
use crate::fetch::{FetchRequest, JsonFetcher};
use crate::slugs::SlugResolver;
use crate::types::{AdapterInput, AdapterOutput, LabelKind, LookupContext};
use crate::utils::RetryPolicy;
use async_trait::async_trait;
use serde_json::{json, Value};
use shelf_common::isbn::isbn10_to_isbn13;
use std::sync::Arc;

pub const SOURCE_ID: &str = "wikidata";
pub const DEFAULT_ENDPOINT: &str = "https://query.wikidata.org/sparql";
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

const RESULT_LIMIT: u32 = 50;

/// Literary work, book, written work
const BOOK_CLASSES: &str = "wd:Q7725634 wd:Q571 wd:Q47461344";

/// Bound variable → kind
const BOUND_VARS: [(&str, LabelKind); 3] = [
    ("genre", LabelKind::Genre),
    ("subject", LabelKind::Topic),
    ("setting", LabelKind::Setting),
];

/// Wikidata SPARQL adapter
pub struct WikidataAdapter {
    client: SourceClient,
    resolver: SlugResolver,
    strict: bool,
}

impl WikidataAdapter {
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

    /// One ISBN attempt covering every known ISBN, then exact-label title
    /// attempts. Token relaxations make no sense against exact labels.
    fn attempts(input: &AdapterInput) -> Vec<QueryAttempt> {
        let mut attempts = Vec::new();
        let isbns = isbn_values(input);
        if !isbns.0.is_empty() || !isbns.1.is_empty() {
            let all: Vec<&str> = isbns.0.iter().chain(&isbns.1).map(String::as_str).collect();
            attempts.push(QueryAttempt::new(AttemptKind::Identifier, all.join(" ")));
        }
        attempts.extend(title_attempts(input).into_iter().filter(|a| {
            matches!(
                a.kind,
                AttemptKind::TitleAuthor | AttemptKind::Title | AttemptKind::MainTitle
            )
        }));
        dedup_attempts(attempts)
    }

    fn request_for(&self, input: &AdapterInput, attempt: &QueryAttempt) -> FetchRequest {
        let sparql = match attempt.kind {
            AttemptKind::Identifier => {
                let (isbn13s, isbn10s) = isbn_values(input);
                isbn_query(&isbn13s, &isbn10s)
            }
            AttemptKind::TitleAuthor => match (input.title(), input.authors().next()) {
                (Some(title), Some(author)) => title_author_query(title, author),
                _ => title_query(&attempt.query),
            },
            _ => title_query(&attempt.query),
        };
        sparql_request(&self.client, sparql)
    }
}

#[async_trait]
impl SourceAdapter for WikidataAdapter {
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
                |attempt| self.request_for(input, attempt),
                parse_bindings,
            )
            .await?;

        let headings = outcome
            .search
            .results
            .iter()
            .flat_map(headings_from_binding)
            .collect();
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

/// GET a SPARQL query with the JSON results content type
pub fn sparql_request(client: &SourceClient, sparql: String) -> FetchRequest {
    client
        .request()
        .param("query", sparql)
        .param("format", "json")
        .accept(SPARQL_RESULTS_JSON)
}

/// `results.bindings` of a SPARQL JSON response
pub fn sparql_bindings(body: &Value) -> Vec<Value> {
    body.pointer("/results/bindings")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Value of `?var` in one binding
pub fn binding_value<'a>(binding: &'a Value, var: &str) -> Option<&'a str> {
    binding.get(var)?.get("value")?.as_str()
}

/// Quote and escape a SPARQL string literal
pub fn sparql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `Q42` from `http://www.wikidata.org/entity/Q42`
pub fn entity_id(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// ISBN-13 values (including converted ISBN-10) and ISBN-10 values
pub(crate) fn isbn_values(input: &AdapterInput) -> (Vec<String>, Vec<String>) {
    let isbn10 = input.isbn10();
    let mut isbn13s: Vec<String> = input.isbn13().into_iter().collect();
    if let Some(converted) = isbn10.as_deref().and_then(isbn10_to_isbn13) {
        if !isbn13s.contains(&converted) {
            isbn13s.push(converted);
        }
    }
    (isbn13s, isbn10.into_iter().collect())
}

fn values_clause(var: &str, values: &[String]) -> String {
    let literals: Vec<String> = values.iter().map(|v| sparql_literal(v)).collect();
    format!("VALUES ?{} {{ {} }}", var, literals.join(" "))
}

const SELECT_HEAD: &str =
    "SELECT DISTINCT ?item ?genre ?genreLabel ?subject ?subjectLabel ?setting ?settingLabel WHERE {";

fn select_tail() -> String {
    format!(
        "  OPTIONAL {{ ?item wdt:P136 ?genre . }}\n  \
         OPTIONAL {{ ?item wdt:P921 ?subject . }}\n  \
         OPTIONAL {{ ?item wdt:P840 ?setting . }}\n  \
         SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }}\n\
         }}\nLIMIT {}",
        RESULT_LIMIT
    )
}

/// Graph pattern binding `?item` to the work (or edition) with these ISBNs
pub fn isbn_item_pattern(isbn13s: &[String], isbn10s: &[String]) -> String {
    let mut branches = Vec::new();
    if !isbn13s.is_empty() {
        branches.push(format!("{{ {} ?edition wdt:P212 ?isbn13 . }}", values_clause("isbn13", isbn13s)));
    }
    if !isbn10s.is_empty() {
        branches.push(format!("{{ {} ?edition wdt:P957 ?isbn10 . }}", values_clause("isbn10", isbn10s)));
    }
    format!(
        "  {}\n  OPTIONAL {{ ?edition wdt:P629 ?work . }}\n  BIND(COALESCE(?work, ?edition) AS ?item)",
        branches.join("\n  UNION\n  ")
    )
}

/// Graph pattern binding `?item` by exact English title and author label
pub fn title_author_item_pattern(title: &str, author: &str) -> String {
    format!(
        "  ?item rdfs:label {}@en ; wdt:P50 ?author .\n  ?author rdfs:label {}@en .",
        sparql_literal(title),
        sparql_literal(author)
    )
}

/// Editions by ISBN, resolved to their work when one is linked
pub fn isbn_query(isbn13s: &[String], isbn10s: &[String]) -> String {
    format!("{}\n{}\n{}", SELECT_HEAD, isbn_item_pattern(isbn13s, isbn10s), select_tail())
}

/// Works by exact English title and author label
pub fn title_author_query(title: &str, author: &str) -> String {
    format!("{}\n{}\n{}", SELECT_HEAD, title_author_item_pattern(title, author), select_tail())
}

/// Book-like items by exact English title
pub fn title_query(title: &str) -> String {
    format!(
        "{}\n  VALUES ?class {{ {} }}\n  ?item rdfs:label {}@en ; wdt:P31 ?class .\n{}",
        SELECT_HEAD,
        BOOK_CLASSES,
        sparql_literal(title),
        select_tail()
    )
}

/// Bindings that carry at least one classifying value
fn parse_bindings(body: &Value) -> Vec<Value> {
    sparql_bindings(body)
        .into_iter()
        .filter(|b| BOUND_VARS.iter().any(|(var, _)| binding_value(b, var).is_some()))
        .collect()
}

fn headings_from_binding(binding: &Value) -> Vec<RawHeading> {
    let item = binding_value(binding, "item");
    BOUND_VARS
        .iter()
        .filter_map(|(var, kind)| {
            let uri = binding_value(binding, var)?;
            let qid = entity_id(uri);
            let label = binding_value(binding, &format!("{}Label", var)).unwrap_or(qid);
            Some(RawHeading {
                label: label.to_string(),
                id: Some(qid.to_string()),
                url: Some(uri.to_string()),
                kind: *kind,
                raw: json!({ "var": var, "item": item, "value": uri, "label": label }),
            })
        })
        .collect()
}
