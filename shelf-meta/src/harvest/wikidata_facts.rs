//! Wikidata descriptive facts
//!
//! Same item resolution as the taxonomy adapter (ISBN → edition → work, or
//! exact title + author), but collects human-readable facts instead of
//! classifying values.

use super::{cached_fetch, into_harvested, HarvestContext, Harvested};
use crate::adapters::wikidata::{
    binding_value, entity_id, isbn_item_pattern, isbn_values, sparql_bindings, sparql_request,
    title_author_item_pattern,
};
use crate::adapters::SourceClient;
use crate::config::SourceSettings;
use crate::error::{FetchError, MetaResult};
use crate::fetch::JsonFetcher;
use crate::types::AdapterInput;
use crate::utils::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "wikidata-facts";

const RESULT_LIMIT: u32 = 200;

/// (SPARQL variable, property, fact name)
const FACT_PROPERTIES: &[(&str, &str, &str)] = &[
    ("author", "P50", "author"),
    ("series", "P179", "series"),
    ("genre", "P136", "genre"),
    ("subject", "P921", "main subject"),
    ("setting", "P840", "narrative location"),
    ("country", "P495", "country of origin"),
    ("language", "P407", "language"),
    ("award", "P166", "award received"),
    ("followedBy", "P156", "followed by"),
    ("follows", "P155", "follows"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikidataFacts {
    /// Entity id of the work (`Q...`)
    pub item: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    /// Fact name → distinct labels in first-seen order
    #[serde(default)]
    pub facts: BTreeMap<String, Vec<String>>,
}

pub struct WikidataFactsClient {
    client: SourceClient,
}

impl WikidataFactsClient {
    pub fn new(settings: &SourceSettings, fetcher: Arc<dyn JsonFetcher>, retry: RetryPolicy) -> Self {
        Self {
            client: SourceClient::new(NAMESPACE, settings, fetcher, retry),
        }
    }

    pub async fn harvest(&self, input: &AdapterInput, ctx: &HarvestContext) -> MetaResult<Harvested<WikidataFacts>> {
        let Some(pattern) = item_pattern(input) else {
            return Ok(Harvested {
                evidence: None,
                notes: vec![format!("{}: skipped, no ISBN or title+author", NAMESPACE)],
            });
        };

        let result = cached_fetch(NAMESPACE, input, ctx, move || {
            self.fetch_facts(pattern, ctx.cancel.as_ref())
        })
        .await?;
        Ok(into_harvested(NAMESPACE, result))
    }

    async fn fetch_facts(
        &self,
        pattern: String,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<WikidataFacts>, FetchError> {
        let request = sparql_request(&self.client, facts_query(&pattern));
        let body = self.client.fetch(&request, cancel).await?;
        Ok(facts_from_bindings(&sparql_bindings(&body)))
    }
}

fn item_pattern(input: &AdapterInput) -> Option<String> {
    let (isbn13s, isbn10s) = isbn_values(input);
    if !isbn13s.is_empty() || !isbn10s.is_empty() {
        return Some(isbn_item_pattern(&isbn13s, &isbn10s));
    }
    match (input.title(), input.authors().next()) {
        (Some(title), Some(author)) => Some(title_author_item_pattern(title, author)),
        _ => None,
    }
}

/// SPARQL selecting the item, its description, publication date and every fact property
pub fn facts_query(item_pattern: &str) -> String {
    let mut select = String::from("SELECT ?item ?itemLabel ?itemDescription ?publicationDate");
    let mut optionals = String::from("  OPTIONAL { ?item wdt:P577 ?publicationDate . }\n");
    for (var, property, _) in FACT_PROPERTIES {
        select.push_str(&format!(" ?{}Label", var));
        optionals.push_str(&format!("  OPTIONAL {{ ?item wdt:{} ?{} . }}\n", property, var));
    }
    format!(
        "{} WHERE {{\n{}\n{}  SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"en\". }}\n}}\nLIMIT {}",
        select, item_pattern, optionals, RESULT_LIMIT
    )
}

/// Fold bindings for the first item into one facts record
fn facts_from_bindings(bindings: &[Value]) -> Option<WikidataFacts> {
    let first_item = bindings.iter().find_map(|b| binding_value(b, "item"))?;
    let mut facts = WikidataFacts {
        item: entity_id(first_item).to_string(),
        ..Default::default()
    };

    for binding in bindings
        .iter()
        .filter(|b| binding_value(b, "item") == Some(first_item))
    {
        let text = |var: &str| binding_value(binding, var).map(str::to_string);
        facts.label = facts.label.take().or_else(|| text("itemLabel"));
        facts.description = facts.description.take().or_else(|| text("itemDescription"));
        facts.publication_date = facts
            .publication_date
            .take()
            .or_else(|| text("publicationDate").map(|d| d.chars().take(10).collect()));

        for (var, _, name) in FACT_PROPERTIES {
            let Some(label) = binding_value(binding, &format!("{}Label", var)) else {
                continue;
            };
            let values = facts.facts.entry(name.to_string()).or_default();
            if !values.iter().any(|v| v == label) {
                values.push(label.to_string());
            }
        }
    }

    Some(facts)
}
