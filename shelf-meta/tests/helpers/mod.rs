//! Test Helper Utilities
//!
//! Shared utilities for shelf-meta integration tests

use async_trait::async_trait;
use serde_json::{json, Value};
use shelf_meta::config::{MetaConfig, SourceSettings};
use shelf_meta::fetch::{FetchRequest, JsonFetcher};
use shelf_meta::utils::RetryPolicy;
use shelf_meta::FetchError;
use std::path::Path;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Offline fetcher answering by URL substring; first matching route wins.
///
/// Unrouted URLs answer `{}` (an empty result for every client).
#[derive(Default)]
pub struct StubFetcher {
    routes: Vec<(String, Result<Value, FetchError>)>,
    pub requests: Mutex<Vec<FetchRequest>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url_fragment: &str, response: Value) -> Self {
        self.routes.push((url_fragment.to_string(), Ok(response)));
        self
    }

    pub fn fail(mut self, url_fragment: &str, error: FetchError) -> Self {
        self.routes.push((url_fragment.to_string(), Err(error)));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl JsonFetcher for StubFetcher {
    async fn get_json(
        &self,
        request: &FetchRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, FetchError> {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(FetchError::Cancelled);
        }
        self.requests.lock().unwrap().push(request.clone());
        self.routes
            .iter()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Config rooted in `dir` with no rate-limit delays and no retries
pub fn test_config(dir: &Path) -> MetaConfig {
    let unthrottled = |s: SourceSettings| SourceSettings {
        delay_ms: 0,
        jitter_ms: 0,
        ..s
    };
    let defaults = MetaConfig::default();
    MetaConfig {
        cache_dir: dir.join("cache"),
        review_queue_path: dir.join("review-queue.json"),
        mappings_path: dir.join("subject-mappings.json"),
        taxonomy_path: dir.join("taxonomy.json"),
        retry: RetryPolicy::none(),
        loc: unthrottled(defaults.loc.clone()),
        fast: unthrottled(defaults.fast.clone()),
        wikidata: unthrottled(defaults.wikidata.clone()),
        openlibrary: unthrottled(defaults.openlibrary.clone()),
        google_books: unthrottled(defaults.google_books.clone()),
        wikipedia: unthrottled(defaults.wikipedia.clone()),
        ..defaults
    }
}
