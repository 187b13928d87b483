//! End-to-end digest run: embed, cluster, curate or summarize, select, assemble.
//!
//! The pipeline owns the injected service handles and never reads global configuration. Every
//! intermediate structure is returned in [`DigestRun`] so callers can snapshot a run.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::clustering::{cluster, label_clusters, merge_miscellaneous_clusters};
use crate::curation::{ClusterCurator, ClusterSummary, CurationError};
use crate::digest::{DigestInput, DigestLayout, DigestSection, assemble_digest};
use crate::embedding::{ArticleEmbedder, EmbedderSettings, EmbeddingClient, EmbeddingError};
use crate::format::format_article_listing;
use crate::generation::{MeteredGenerator, TextGenerator};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::prompts::PromptTemplates;
use crate::retry::RetryPolicy;
use crate::selection::{ArticleSelector, SelectionError};
use crate::types::{Article, Cluster, CuratedCluster, Selection};

/// Pipeline-level tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Number of partitions requested from clustering (k).
    pub cluster_count: usize,
    /// Size of the top-N selection in the curated layout.
    pub top_article_count: usize,
    /// Retry schedule for generation calls.
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cluster_count: 8,
            top_article_count: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Failures that abort a digest run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No article could be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// A cluster could not be curated or summarized.
    #[error(transparent)]
    Curation(#[from] CurationError),
    /// The deep-dive synthesis failed.
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Everything a run produced, in a form callers can persist.
#[derive(Debug, Clone, Serialize)]
pub struct DigestRun {
    /// Layout that was assembled.
    pub layout: DigestLayout,
    /// Ids of articles whose embedding batch failed.
    pub failed_article_ids: Vec<String>,
    /// Labeled clusters after the miscellaneous merge.
    pub clusters: Vec<Cluster>,
    /// Curated clusters (curated layout only).
    pub curated: Vec<CuratedCluster>,
    /// Isolated cluster summaries (weekly layout only).
    pub summaries: Vec<ClusterSummary>,
    /// Featured articles.
    pub selection: Selection,
    /// Deep-dive markdown over the featured articles.
    pub deep_dive: String,
    /// Final digest document.
    pub document: String,
    /// Counters at the end of the run.
    pub metrics: MetricsSnapshot,
}

/// Orchestrates the digest stages over injected clients.
pub struct DigestPipeline {
    embedder: ArticleEmbedder,
    curator: ClusterCurator,
    selector: ArticleSelector,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

impl DigestPipeline {
    /// Wire a pipeline from its collaborators. The generator is wrapped so every call is counted.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn TextGenerator>,
        prompts: Arc<PromptTemplates>,
        embedder_settings: EmbedderSettings,
        settings: PipelineSettings,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let generator: Arc<dyn TextGenerator> =
            Arc::new(MeteredGenerator::new(generator, Arc::clone(&metrics)));

        Self {
            embedder: ArticleEmbedder::new(embedding_client, embedder_settings),
            curator: ClusterCurator::new(
                Arc::clone(&generator),
                Arc::clone(&prompts),
                settings.retry,
            ),
            selector: ArticleSelector::new(generator, prompts, settings.retry),
            settings,
            metrics,
        }
    }

    /// Current counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Produce a digest of `articles` in the requested layout.
    pub async fn run(
        &self,
        articles: &[Article],
        layout: DigestLayout,
    ) -> Result<DigestRun, PipelineError> {
        tracing::info!(articles = articles.len(), layout = %layout, "Starting digest run");

        let outcome = self.embedder.embed(articles).await?;
        self.metrics.record_embedding(
            outcome.embedded.len() as u64,
            outcome.failed_ids.len() as u64,
            outcome.failed_batches as u64,
        );

        let clustering = cluster(&outcome.embedded, self.settings.cluster_count);
        self.metrics.record_clusters(clustering.clusters.len() as u64);
        let clusters = merge_miscellaneous_clusters(label_clusters(clustering.clusters));

        let (curated, summaries, selection, deep_dive, sections) = match layout {
            DigestLayout::Curated => {
                let (curated, (selection, deep_dive)) = tokio::try_join!(
                    async {
                        self.curator
                            .curate_all(&clusters)
                            .await
                            .map_err(PipelineError::from)
                    },
                    async {
                        let selection = self
                            .selector
                            .select_top(articles, self.settings.top_article_count)
                            .await;
                        let deep_dive = self.selector.deep_dive(&selection).await?;
                        Ok::<_, PipelineError>((selection, deep_dive))
                    },
                )?;
                let sections = curated_sections(&clusters, &curated);
                (curated, Vec::new(), selection, deep_dive, sections)
            }
            DigestLayout::Weekly => {
                let selection = self.selector.select_best(articles).await;
                let featured = selection.article_ids();
                let (deep_dive, summaries) = tokio::try_join!(
                    async {
                        self.selector
                            .deep_dive(&selection)
                            .await
                            .map_err(PipelineError::from)
                    },
                    async {
                        self.curator
                            .summarize_all(&clusters, &featured)
                            .await
                            .map_err(PipelineError::from)
                    },
                )?;
                let sections = summary_sections(&summaries);
                (Vec::new(), summaries, selection, deep_dive, sections)
            }
        };

        let document = assemble_digest(&DigestInput {
            layout,
            articles,
            topic_count: clusters.len(),
            deep_dive: &deep_dive,
            sections: &sections,
        });

        let metrics = self.metrics.snapshot();
        tracing::info!(
            clusters = clusters.len(),
            featured = selection.selected.len(),
            selection = ?selection.method,
            articles_failed = metrics.articles_failed,
            generation_calls = metrics.generation_calls,
            generation_failures = metrics.generation_failures,
            "Digest run complete"
        );

        Ok(DigestRun {
            layout,
            failed_article_ids: outcome.failed_ids,
            clusters,
            curated,
            summaries,
            selection,
            deep_dive,
            document,
            metrics,
        })
    }
}

/// Pair curated results with their clusters; passthrough clusters render their articles as-is.
fn curated_sections(clusters: &[Cluster], curated: &[CuratedCluster]) -> Vec<DigestSection> {
    clusters
        .iter()
        .zip(curated)
        .map(|(cluster, curated)| DigestSection {
            title: curated.label.clone(),
            content: curated
                .curated_content
                .clone()
                .or_else(|| Some(format_article_listing(&cluster.articles))),
        })
        .collect()
}

fn summary_sections(summaries: &[ClusterSummary]) -> Vec<DigestSection> {
    summaries
        .iter()
        .map(|summary| DigestSection {
            title: summary.label.clone(),
            content: Some(summary.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClusterType, CurationStrategy};

    fn cluster_of(subjects: &[&str]) -> Cluster {
        Cluster {
            id: 0,
            original_id: 0,
            articles: subjects
                .iter()
                .map(|subject| Article::new("src", *subject, "t", "text", vec![]))
                .collect(),
            centroid: None,
            cluster_type: ClusterType::Main,
            label: Some("Label".into()),
        }
    }

    #[test]
    fn passthrough_sections_list_articles() {
        let clusters = vec![cluster_of(&["one", "two"]), cluster_of(&[])];
        let curated = vec![
            CuratedCluster {
                label: "Label".into(),
                original_article_count: 2,
                curated_content: None,
                strategy: CurationStrategy::Passthrough,
            },
            CuratedCluster {
                label: "Other News".into(),
                original_article_count: 0,
                curated_content: Some(String::new()),
                strategy: CurationStrategy::Misc,
            },
        ];

        let sections = curated_sections(&clusters, &curated);
        let listing = sections[0].content.as_deref().expect("listing");
        assert!(listing.contains("**one** (src)") && listing.contains("**two** (src)"));
        assert_eq!(sections[1].content.as_deref(), Some(""));
    }
}
