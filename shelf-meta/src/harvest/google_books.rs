//! Google Books harvest client
//!
//! `volumes?q=isbn:{isbn}` (or an `intitle:`/`inauthor:` query) to find the
//! volume, then `volumes/{id}` for the full record. Search results carry a
//! truncated description, so the volume fetch is what provides the text.

use super::{cached_fetch, into_harvested, not_found_as_none, string_list, text_value, HarvestContext, Harvested};
use crate::adapters::SourceClient;
use crate::config::SourceSettings;
use crate::error::{FetchError, MetaResult};
use crate::fetch::{FetchRequest, JsonFetcher};
use crate::types::AdapterInput;
use crate::utils::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "google-books";
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/books/v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBooksEvidence {
    pub volume_id: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u64>,
    pub maturity_rating: Option<String>,
}

pub struct GoogleBooksClient {
    client: SourceClient,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(settings: &SourceSettings, fetcher: Arc<dyn JsonFetcher>, retry: RetryPolicy) -> Self {
        Self {
            client: SourceClient::new(NAMESPACE, settings, fetcher, retry),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub async fn harvest(&self, input: &AdapterInput, ctx: &HarvestContext) -> MetaResult<Harvested<GoogleBooksEvidence>> {
        let result = cached_fetch(NAMESPACE, input, ctx, move || {
            self.fetch_evidence(input, ctx.cancel.as_ref())
        })
        .await?;
        Ok(into_harvested(NAMESPACE, result))
    }

    fn request(&self, path: &str) -> FetchRequest {
        let url = format!("{}{}", self.client.endpoint().trim_end_matches('/'), path);
        let request = self.client.request_to(url);
        match &self.api_key {
            Some(key) => request.param("key", key.clone()),
            None => request,
        }
    }

    async fn fetch_evidence(
        &self,
        input: &AdapterInput,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<GoogleBooksEvidence>, FetchError> {
        let Some(query) = search_query(input) else {
            return Ok(None);
        };

        let search = self.request("/volumes").param("q", query).param("maxResults", "1");
        let body = self.client.fetch(&search, cancel).await?;
        let Some(item) = body.pointer("/items/0") else {
            return Ok(None);
        };
        let Some(volume_id) = item.get("id").and_then(Value::as_str) else {
            return Ok(None);
        };

        let volume_request = self.request(&format!("/volumes/{}", volume_id));
        let volume = not_found_as_none(self.client.fetch(&volume_request, cancel).await)?;
        let volume = volume.as_ref().unwrap_or(item);

        Ok(Some(evidence_from_volume(volume_id, volume)))
    }
}

/// `isbn:{isbn}` when an ISBN is known, else `intitle:"..." inauthor:"..."`
pub fn search_query(input: &AdapterInput) -> Option<String> {
    if let Some(isbn) = input.isbn13().or_else(|| input.isbn10()) {
        return Some(format!("isbn:{}", isbn));
    }
    let title = input.title()?;
    let mut query = format!("intitle:\"{}\"", title.replace('"', ""));
    if let Some(author) = input.authors().next() {
        query.push_str(&format!(" inauthor:\"{}\"", author.replace('"', "")));
    }
    Some(query)
}

fn evidence_from_volume(volume_id: &str, volume: &Value) -> GoogleBooksEvidence {
    let info = volume.get("volumeInfo").unwrap_or(&Value::Null);
    let str_field = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);

    GoogleBooksEvidence {
        volume_id: volume_id.to_string(),
        title: str_field("title"),
        subtitle: str_field("subtitle"),
        description: text_value(info.get("description")),
        categories: string_list(info.get("categories")),
        published_date: str_field("publishedDate"),
        page_count: info.get("pageCount").and_then(Value::as_u64),
        maturity_rating: str_field("maturityRating"),
    }
}
