//! Wikipedia harvest client
//!
//! One `action=query` call per candidate page title (`"{title} (novel)"`,
//! then `"{title}"`) returning the plain-text intro, visible categories,
//! the lead-section wikitext (for the infobox) and the canonical URL.
//! Missing pages and disambiguation pages are skipped.

use super::{cached_fetch, into_harvested, HarvestContext, Harvested};
use crate::adapters::SourceClient;
use crate::config::SourceSettings;
use crate::error::{FetchError, MetaResult};
use crate::fetch::JsonFetcher;
use crate::types::AdapterInput;
use crate::utils::RetryPolicy;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const NAMESPACE: &str = "wikipedia";
pub const DEFAULT_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";

/// Infobox fields worth keeping
const INFOBOX_FIELDS: &[&str] = &[
    "author", "country", "language", "series", "genre", "subject", "set_in", "published",
    "publisher", "pages", "followed_by", "preceded_by",
];

static INFOBOX_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\|\s*([a-z_ ]+?)\s*=\s*(.*?)\s*$").expect("valid regex"));
static WIKI_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]*)\]\]").expect("valid regex"));
static MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\{\{[^}]*\}\}|<[^>]+>|'{2,})").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikipediaEvidence {
    pub title: String,
    pub url: Option<String>,
    pub extract: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub infobox: BTreeMap<String, String>,
}

pub struct WikipediaClient {
    client: SourceClient,
}

impl WikipediaClient {
    pub fn new(settings: &SourceSettings, fetcher: Arc<dyn JsonFetcher>, retry: RetryPolicy) -> Self {
        Self {
            client: SourceClient::new(NAMESPACE, settings, fetcher, retry),
        }
    }

    /// `title_hint` replaces the input title when a catalog supplied a canonical one
    pub async fn harvest(
        &self,
        input: &AdapterInput,
        title_hint: Option<&str>,
        ctx: &HarvestContext,
    ) -> MetaResult<Harvested<WikipediaEvidence>> {
        let Some(title) = title_hint.or_else(|| input.title()).map(str::to_string) else {
            return Ok(Harvested {
                evidence: None,
                notes: vec![format!("{}: skipped, no title", NAMESPACE)],
            });
        };

        let result = cached_fetch(NAMESPACE, input, ctx, move || {
            self.fetch_evidence(title, ctx.cancel.as_ref())
        })
        .await?;
        Ok(into_harvested(NAMESPACE, result))
    }

    async fn fetch_evidence(
        &self,
        title: String,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<WikipediaEvidence>, FetchError> {
        for candidate in candidate_titles(&title) {
            let request = self
                .client
                .request()
                .param("action", "query")
                .param("format", "json")
                .param("formatversion", "2")
                .param("redirects", "1")
                .param("titles", candidate.clone())
                .param("prop", "extracts|revisions|categories|info")
                .param("exintro", "1")
                .param("explaintext", "1")
                .param("rvprop", "content")
                .param("rvslots", "main")
                .param("rvsection", "0")
                .param("cllimit", "max")
                .param("clshow", "!hidden")
                .param("inprop", "url");

            let body = self.client.fetch(&request, cancel).await?;
            match evidence_from_response(&body) {
                Some(evidence) => return Ok(Some(evidence)),
                None => debug!(title = %candidate, "No usable Wikipedia page"),
            }
        }
        Ok(None)
    }
}

fn candidate_titles(title: &str) -> Vec<String> {
    let title = title.trim();
    let mut candidates = vec![format!("{} (novel)", title), title.to_string()];
    if let Some((main, _)) = title.split_once(':') {
        let main = main.trim();
        if !main.is_empty() {
            candidates.push(main.to_string());
        }
    }
    candidates
}

fn evidence_from_response(body: &Value) -> Option<WikipediaEvidence> {
    let page = body.pointer("/query/pages/0")?;
    if page.get("missing").is_some() || page.get("invalid").is_some() {
        return None;
    }

    let categories: Vec<String> = page
        .get("categories")
        .and_then(Value::as_array)
        .map(|cats| {
            cats.iter()
                .filter_map(|c| c.get("title").and_then(Value::as_str))
                .map(|t| t.trim_start_matches("Category:").to_string())
                .collect()
        })
        .unwrap_or_default();
    if categories.iter().any(|c| c.to_lowercase().contains("disambiguation")) {
        return None;
    }

    let wikitext = page
        .pointer("/revisions/0/slots/main/content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Some(WikipediaEvidence {
        title: page.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
        url: page.get("fullurl").and_then(Value::as_str).map(str::to_string),
        extract: page
            .get("extract")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
        categories,
        infobox: parse_infobox(wikitext),
    })
}

/// Selected `| field = value` lines of the lead infobox, markup stripped
pub fn parse_infobox(wikitext: &str) -> BTreeMap<String, String> {
    wikitext
        .lines()
        .filter_map(|line| {
            let caps = INFOBOX_LINE.captures(line)?;
            let field = caps[1].trim().replace(' ', "_");
            if !INFOBOX_FIELDS.contains(&field.as_str()) {
                return None;
            }
            let value = strip_markup(&caps[2]);
            (!value.is_empty()).then_some((field, value))
        })
        .collect()
}

fn strip_markup(value: &str) -> String {
    let linked = WIKI_LINK.replace_all(value, "$1");
    let plain = MARKUP.replace_all(&linked, "");
    plain.split_whitespace().collect::<Vec<_>>().join(" ")
}
