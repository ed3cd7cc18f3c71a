//! Metadata orchestrator
//!
//! Dispatches one lookup to the selected adapters, strictly in sequence, and
//! folds their labels into one aggregate per slug.
//!
//! # Merge rules
//! - The first label for a slug seeds name, kind and confidence; taxonomy
//!   comes from the taxonomy index, else the label's own hints
//! - A later label replaces confidence, name and kind only when its
//!   confidence is strictly higher (ties keep the earlier source)
//! - Taxonomy fields are filled first-write-wins
//! - Each contributing source appears once in `sources`, in order of first
//!   contribution, holding that source's highest confidence
//! - Raw evidence is appended to the per-source raw bag
//!
//! Adapter failures never fail the lookup (they arrive as notes); only cache
//! I/O errors propagate.

use crate::adapters::SourceAdapter;
use crate::cache::FileCache;
use crate::error::MetaResult;
use crate::taxonomy::TaxonomyIndex;
use crate::types::{AdapterInput, AdapterLabel, AggregatedLabel, LookupContext, SourceContribution, TaxonomyHints};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notes not attributable to a single adapter
pub const ORCHESTRATOR_NOTES: &str = "orchestrator";

/// Per-call lookup options
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Adapter ids to query, in order; `None` queries all in registration order
    pub sources: Option<Vec<String>>,
    pub cancel: Option<CancellationToken>,
}

/// Aggregated lookup result
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorResult {
    pub labels: Vec<AggregatedLabel>,
    pub by_source: BTreeMap<String, Vec<AdapterLabel>>,
    pub notes: BTreeMap<String, Vec<String>>,
}

/// Fans lookups out to registered adapters
pub struct MetadataOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    by_id: HashMap<String, usize>,
    taxonomy: Arc<TaxonomyIndex>,
    cache: Option<FileCache>,
}

impl MetadataOrchestrator {
    /// Register adapters; a repeated id keeps the first registration
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        taxonomy: Arc<TaxonomyIndex>,
        cache: Option<FileCache>,
    ) -> Self {
        let mut by_id = HashMap::new();
        let mut registered = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let id = adapter.id().to_lowercase();
            if by_id.contains_key(&id) {
                warn!(source = %id, "Duplicate adapter id ignored");
                continue;
            }
            by_id.insert(id, registered.len());
            registered.push(adapter);
        }

        Self {
            adapters: registered,
            by_id,
            taxonomy,
            cache,
        }
    }

    /// Registered adapter ids in registration order
    pub fn source_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub async fn lookup_all(&self, input: &AdapterInput, options: LookupOptions) -> MetaResult<OrchestratorResult> {
        let mut result = OrchestratorResult::default();
        let mut orchestrator_notes = Vec::new();

        let selected: Vec<&Arc<dyn SourceAdapter>> = match &options.sources {
            None => self.adapters.iter().collect(),
            Some(ids) => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter_map(|id| {
                        let key = id.trim().to_lowercase();
                        if !seen.insert(key.clone()) {
                            return None;
                        }
                        match self.by_id.get(&key) {
                            Some(&i) => Some(&self.adapters[i]),
                            None => {
                                orchestrator_notes.push(format!("unknown source \"{}\"", id.trim()));
                                None
                            }
                        }
                    })
                    .collect()
            }
        };

        let ctx = LookupContext {
            cache: self.cache.clone(),
            cancel: options.cancel.clone(),
        };
        let mut aggregator = LabelAggregator::new(&self.taxonomy);

        for adapter in selected {
            let source = adapter.id().to_string();
            if ctx.is_cancelled() {
                orchestrator_notes.push(format!("cancelled before {}", source));
                break;
            }

            debug!(source = %source, "Dispatching lookup");
            let output = adapter.lookup(input, &ctx).await?;
            debug!(
                source = %source,
                labels = output.labels.len(),
                notes = output.notes.len(),
                "Adapter lookup finished"
            );

            for label in &output.labels {
                aggregator.add(label);
            }
            if !output.notes.is_empty() {
                result.notes.insert(source.clone(), output.notes);
            }
            result.by_source.insert(source, output.labels);
        }

        if !orchestrator_notes.is_empty() {
            result.notes.insert(ORCHESTRATOR_NOTES.to_string(), orchestrator_notes);
        }
        result.labels = aggregator.into_labels();

        info!(
            sources = result.by_source.len(),
            labels = result.labels.len(),
            "Metadata lookup complete"
        );
        Ok(result)
    }
}

/// Slug-keyed fold of adapter labels
pub struct LabelAggregator<'a> {
    taxonomy: &'a TaxonomyIndex,
    labels: Vec<AggregatedLabel>,
    index: HashMap<String, usize>,
}

impl<'a> LabelAggregator<'a> {
    pub fn new(taxonomy: &'a TaxonomyIndex) -> Self {
        Self {
            taxonomy,
            labels: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn add(&mut self, label: &AdapterLabel) {
        let Some(i) = self.index.get(&label.slug).copied() else {
            let mut taxonomy = self
                .taxonomy
                .lookup(&label.slug)
                .map(|meta| meta.hints())
                .unwrap_or_default();
            fill_taxonomy(&mut taxonomy, &label.taxonomy);
            self.index.insert(label.slug.clone(), self.labels.len());
            self.labels.push(AggregatedLabel {
                slug: label.slug.clone(),
                name: label.name.clone(),
                kind: label.kind,
                confidence: label.confidence,
                taxonomy,
                sources: vec![contribution(label)],
                raw: BTreeMap::from([(label.source.clone(), label.raw.clone())]),
            });
            return;
        };

        let aggregate = &mut self.labels[i];
        if label.confidence > aggregate.confidence {
            aggregate.confidence = label.confidence;
            aggregate.name = label.name.clone();
            aggregate.kind = label.kind;
        }
        fill_taxonomy(&mut aggregate.taxonomy, &label.taxonomy);

        match aggregate.sources.iter_mut().find(|s| s.source == label.source) {
            Some(existing) => {
                existing.confidence = existing.confidence.max(label.confidence);
                if existing.external_id.is_none() {
                    existing.external_id = label.external_id.clone();
                }
                if existing.url.is_none() {
                    existing.url = label.url.clone();
                }
            }
            None => aggregate.sources.push(contribution(label)),
        }

        aggregate
            .raw
            .entry(label.source.clone())
            .or_default()
            .extend(label.raw.iter().cloned());
    }

    pub fn into_labels(self) -> Vec<AggregatedLabel> {
        self.labels
    }
}

fn contribution(label: &AdapterLabel) -> SourceContribution {
    SourceContribution {
        source: label.source.clone(),
        confidence: label.confidence,
        external_id: label.external_id.clone(),
        url: label.url.clone(),
    }
}

fn fill_taxonomy(target: &mut TaxonomyHints, hints: &TaxonomyHints) {
    if target.taxonomy_type.is_none() {
        target.taxonomy_type = hints.taxonomy_type.clone();
    }
    if target.taxonomy_group.is_none() {
        target.taxonomy_group = hints.taxonomy_group.clone();
    }
    if target.taxonomy_parent.is_none() {
        target.taxonomy_parent = hints.taxonomy_parent.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockAdapter;
    use crate::types::{Confidence, LabelKind};

    fn orchestrator(adapters: Vec<Arc<dyn SourceAdapter>>) -> MetadataOrchestrator {
        MetadataOrchestrator::new(adapters, Arc::new(TaxonomyIndex::default()), None)
    }

    fn input() -> AdapterInput {
        AdapterInput {
            title: Some("Leviathan Wakes".into()),
            ..Default::default()
        }
    }

    fn label(source: &str, slug: &str, name: &str, kind: LabelKind, confidence: Confidence) -> AdapterLabel {
        AdapterLabel {
            slug: slug.into(),
            name: name.into(),
            source: source.into(),
            confidence,
            kind,
            raw: vec![serde_json::json!(name)],
            external_id: None,
            url: None,
            taxonomy: TaxonomyHints::default(),
        }
    }

    #[tokio::test]
    async fn test_space_opera_escalates_to_high() {
        // Scenario: two sources resolve the same slug at different confidence
        let fast = MockAdapter::new("fast").with_label("space-opera", "Space opera", LabelKind::Genre, Confidence::Medium);
        let wikidata =
            MockAdapter::new("wikidata").with_label("space-opera", "space opera", LabelKind::Genre, Confidence::High);

        let result = orchestrator(vec![Arc::new(fast), Arc::new(wikidata)])
            .lookup_all(&input(), LookupOptions::default())
            .await
            .unwrap();

        assert_eq!(result.labels.len(), 1);
        let aggregate = &result.labels[0];
        assert_eq!(aggregate.confidence, Confidence::High);
        assert_eq!(aggregate.name, "space opera");
        let sources: Vec<&str> = aggregate.sources.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(sources, vec!["fast", "wikidata"]);
        assert_eq!(aggregate.raw.len(), 2);
        assert_eq!(result.by_source["fast"].len(), 1);
    }

    #[test]
    fn test_confidence_is_max_regardless_of_order() {
        let taxonomy = TaxonomyIndex::default();
        let labels = [
            label("loc", "dragons", "Dragons", LabelKind::Topic, Confidence::Low),
            label("fast", "dragons", "Dragons", LabelKind::Topic, Confidence::High),
            label("wikidata", "dragons", "dragon", LabelKind::Topic, Confidence::Medium),
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let mut aggregator = LabelAggregator::new(&taxonomy);
            for i in order {
                aggregator.add(&labels[i]);
            }
            let merged = aggregator.into_labels();
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].confidence, Confidence::High, "order {:?}", order);
            assert_eq!(merged[0].sources.len(), 3);
        }
    }

    #[test]
    fn test_tie_keeps_first_name_and_kind() {
        let taxonomy = TaxonomyIndex::default();
        let mut aggregator = LabelAggregator::new(&taxonomy);
        aggregator.add(&label("loc", "mars", "Mars (Planet)", LabelKind::Place, Confidence::High));
        aggregator.add(&label("wikidata", "mars", "Mars", LabelKind::Setting, Confidence::High));

        let merged = aggregator.into_labels();
        assert_eq!(merged[0].name, "Mars (Planet)");
        assert_eq!(merged[0].kind, LabelKind::Place);
    }

    #[test]
    fn test_one_contribution_per_source() {
        let taxonomy = TaxonomyIndex::default();
        let mut aggregator = LabelAggregator::new(&taxonomy);
        aggregator.add(&label("loc", "fantasy", "Fantasy fiction", LabelKind::Genre, Confidence::Medium));
        aggregator.add(&label("loc", "fantasy", "Fantasy", LabelKind::Genre, Confidence::High));

        let merged = aggregator.into_labels();
        assert_eq!(merged[0].sources.len(), 1);
        assert_eq!(merged[0].sources[0].confidence, Confidence::High);
        assert_eq!(merged[0].raw["loc"].len(), 2);
    }

    #[test]
    fn test_taxonomy_index_wins_then_hints_fill() {
        let taxonomy = TaxonomyIndex::from_json(
            r#"{ "genre": [ { "slug": "fantasy", "children": [ { "slug": "epic-fantasy" } ] } ] }"#,
        )
        .unwrap();
        let mut aggregator = LabelAggregator::new(&taxonomy);

        let mut hinted = label("loc", "epic-fantasy", "Epic fantasy", LabelKind::Genre, Confidence::High);
        hinted.taxonomy.taxonomy_type = Some("topic".into());
        hinted.taxonomy.taxonomy_group = Some("speculative".into());
        aggregator.add(&hinted);

        let mut unknown = label("loc", "cli-fi", "Climate fiction", LabelKind::Genre, Confidence::Medium);
        aggregator.add(&unknown);
        unknown.source = "fast".into();
        unknown.taxonomy.taxonomy_type = Some("genre".into());
        aggregator.add(&unknown);

        let merged = aggregator.into_labels();
        assert_eq!(merged[0].taxonomy.taxonomy_type.as_deref(), Some("genre"));
        assert_eq!(merged[0].taxonomy.taxonomy_parent.as_deref(), Some("fantasy"));
        // The index has no group for this slug, so the first label's hint fills it
        assert_eq!(merged[0].taxonomy.taxonomy_group.as_deref(), Some("speculative"));
        assert_eq!(merged[1].taxonomy.taxonomy_type.as_deref(), Some("genre"));
    }

    #[tokio::test]
    async fn test_source_filter_and_unknown_source_note() {
        let loc = MockAdapter::new("loc").with_label("fantasy", "Fantasy", LabelKind::Genre, Confidence::High);
        let fast = MockAdapter::new("fast").with_note("skipped: no title");

        let result = orchestrator(vec![Arc::new(loc), Arc::new(fast)])
            .lookup_all(
                &input(),
                LookupOptions {
                    sources: Some(vec!["FAST".into(), "goodreads".into()]),
                    cancel: None,
                },
            )
            .await
            .unwrap();

        assert!(result.labels.is_empty());
        assert_eq!(result.by_source.keys().collect::<Vec<_>>(), vec!["fast"]);
        assert_eq!(result.notes["fast"], vec!["skipped: no title".to_string()]);
        assert_eq!(
            result.notes[ORCHESTRATOR_NOTES],
            vec!["unknown source \"goodreads\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancelled_lookup_returns_partial_result() {
        let token = CancellationToken::new();
        token.cancel();
        let loc = MockAdapter::new("loc").with_label("fantasy", "Fantasy", LabelKind::Genre, Confidence::High);

        let result = orchestrator(vec![Arc::new(loc)])
            .lookup_all(
                &input(),
                LookupOptions {
                    sources: None,
                    cancel: Some(token),
                },
            )
            .await
            .unwrap();

        assert!(result.labels.is_empty());
        assert_eq!(result.notes[ORCHESTRATOR_NOTES], vec!["cancelled before loc".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let o = orchestrator(vec![
            Arc::new(MockAdapter::new("loc")),
            Arc::new(MockAdapter::new("loc")),
            Arc::new(MockAdapter::new("fast")),
        ]);
        assert_eq!(o.source_ids(), vec!["loc", "fast"]);
    }
}
