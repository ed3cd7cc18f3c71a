//! shelf-meta library interface
//!
//! Book metadata aggregation: subject lookups against LoC, FAST and
//! Wikidata merged into slug-keyed labels, plus a descriptive evidence
//! harvest from OpenLibrary, Google Books, Wikipedia and Wikidata.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod orchestrator;
pub mod slugs;
pub mod taxonomy;
pub mod types;
pub mod utils;

pub use crate::error::{FetchError, MetaError, MetaResult};
pub use crate::orchestrator::{LookupOptions, MetadataOrchestrator, OrchestratorResult};
pub use crate::types::{AdapterInput, AdapterLabel, AggregatedLabel, Confidence, LabelKind};

use crate::adapters::{FastAdapter, LocAdapter, SourceAdapter, WikidataAdapter};
use crate::cache::FileCache;
use crate::config::MetaConfig;
use crate::fetch::{JsonFetcher, ReqwestFetcher};
use crate::harvest::{
    EvidenceBundle, EvidenceHarvester, GoogleBooksClient, HarvestContext, OpenLibraryClient, WikidataFactsClient,
    WikipediaClient,
};
use crate::slugs::{ReviewQueue, SlugResolver, SubjectMappings};
use crate::taxonomy::TaxonomyIndex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fully wired engine: orchestrator, harvester and the shared slug resolver
pub struct MetaEngine {
    pub orchestrator: MetadataOrchestrator,
    pub harvester: EvidenceHarvester,
    pub resolver: SlugResolver,
    cache: FileCache,
}

impl MetaEngine {
    /// Build every component from configuration using the reqwest fetcher.
    ///
    /// Mapping and taxonomy tables are loaded once per process.
    pub fn from_config(config: &MetaConfig) -> MetaResult<Self> {
        let fetcher: Arc<dyn JsonFetcher> = Arc::new(ReqwestFetcher::new(&config.user_agent, config.http_timeout)?);
        let mappings = SubjectMappings::shared(&config.mappings_path)?;
        let taxonomy = TaxonomyIndex::shared(&config.taxonomy_path)?;
        Ok(Self::with_parts(config, fetcher, mappings, taxonomy))
    }

    /// Build from already-loaded tables and an arbitrary fetcher
    pub fn with_parts(
        config: &MetaConfig,
        fetcher: Arc<dyn JsonFetcher>,
        mappings: Arc<SubjectMappings>,
        taxonomy: Arc<TaxonomyIndex>,
    ) -> Self {
        let review_queue = Arc::new(ReviewQueue::new(&config.review_queue_path));
        let resolver = SlugResolver::new(mappings, Some(review_queue));
        let cache = FileCache::new(&config.cache_dir);
        let retry = config.retry;

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(LocAdapter::new(&config.loc, fetcher.clone(), resolver.clone(), retry)),
            Arc::new(
                FastAdapter::new(&config.fast, fetcher.clone(), resolver.clone(), retry)
                    .with_api_key(config.fast_api_key.clone())
                    .with_max_suggestions(config.fast_max_suggestions),
            ),
            Arc::new(WikidataAdapter::new(&config.wikidata, fetcher.clone(), resolver.clone(), retry)),
        ];
        let orchestrator = MetadataOrchestrator::new(adapters, taxonomy, Some(cache.clone()));

        let harvester = EvidenceHarvester {
            openlibrary: OpenLibraryClient::new(&config.openlibrary, fetcher.clone(), retry),
            google_books: GoogleBooksClient::new(&config.google_books, fetcher.clone(), retry)
                .with_api_key(config.google_books_api_key.clone()),
            wikipedia: WikipediaClient::new(&config.wikipedia, fetcher.clone(), retry),
            wikidata: WikidataFactsClient::new(&config.wikidata, fetcher, retry),
        };

        info!(
            cache = %config.cache_dir.display(),
            review_queue = %config.review_queue_path.display(),
            "Metadata engine ready"
        );

        Self {
            orchestrator,
            harvester,
            resolver,
            cache,
        }
    }

    pub async fn lookup(&self, input: &AdapterInput, options: LookupOptions) -> MetaResult<OrchestratorResult> {
        self.orchestrator.lookup_all(input, options).await
    }

    pub async fn harvest(
        &self,
        input: &AdapterInput,
        force: bool,
        cancel: Option<CancellationToken>,
    ) -> MetaResult<EvidenceBundle> {
        let ctx = HarvestContext {
            cache: Some(self.cache.clone()),
            cancel,
            force,
        };
        self.harvester.harvest(input, &ctx).await
    }

    /// Wait for detached review-queue writes to land
    pub async fn flush(&self) {
        if let Some(queue) = self.resolver.review_queue() {
            queue.flush().await;
        }
    }
}
