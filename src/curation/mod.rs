//! Per-cluster curation and isolated cluster summaries.
//!
//! Every generation call built here carries exactly one cluster's articles. Article exclusion
//! (for articles already featured elsewhere in the digest) produces a filtered copy of the
//! cluster before any prompt text is formatted.

mod strategy;

pub use strategy::{HEAVY_MIN, LIGHT_MIN, MODERATE_MIN, StrategyPlan, select_strategy};

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::format::{PROMPT_CONTENT_CHARS, format_article_block};
use crate::generation::{GenerationError, TextGenerator};
use crate::prompts::{PromptError, PromptKey, PromptTemplates};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::types::{Cluster, ClusterType, CuratedCluster, CurationStrategy};

/// Miscellaneous clusters at or below this size are passed through.
pub const MISC_PASSTHROUGH_MAX: usize = 3;

/// Errors that abort the curation phase.
#[derive(Debug, Error)]
pub enum CurationError {
    /// A topic cluster's generation call exhausted its retries.
    #[error("curation of cluster '{label}' failed after {attempts} attempts: {source}")]
    Cluster {
        /// Label of the failed cluster.
        label: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: GenerationError,
    },
    /// The miscellaneous cluster's generation call exhausted its retries.
    #[error("curation of the miscellaneous cluster failed after {attempts} attempts: {source}")]
    Miscellaneous {
        /// Attempts made before giving up.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: GenerationError,
    },
    /// A prompt template could not be rendered.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Full, isolated summary of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Topic label.
    pub label: String,
    /// Members summarized, after exclusion.
    pub article_count: usize,
    /// Generated summary text.
    pub content: String,
}

/// Copy of `cluster` without the articles whose ids are in `excluded`.
pub fn exclude_articles(cluster: &Cluster, excluded: &HashSet<String>) -> Cluster {
    Cluster {
        articles: cluster
            .articles
            .iter()
            .filter(|article| !excluded.contains(&article.id))
            .cloned()
            .collect(),
        ..cluster.clone()
    }
}

/// Drives the generation calls that turn clusters into digest sections.
pub struct ClusterCurator {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptTemplates>,
    retry: RetryPolicy,
}

impl ClusterCurator {
    /// Create a curator over the injected generator and templates.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: Arc<PromptTemplates>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            prompts,
            retry,
        }
    }

    /// Curate a main cluster according to its size.
    ///
    /// Passthrough clusters make no call. Any other strategy issues exactly one retried call
    /// whose prompt contains only this cluster's articles.
    pub async fn curate(&self, cluster: &Cluster) -> Result<CuratedCluster, CurationError> {
        let label = cluster.display_label();
        let count = cluster.len();
        let plan = select_strategy(count);

        if plan.strategy == CurationStrategy::Passthrough {
            tracing::debug!(cluster = %label, articles = count, "Passing cluster through");
            return Ok(CuratedCluster {
                label,
                original_article_count: count,
                curated_content: None,
                strategy: CurationStrategy::Passthrough,
            });
        }

        let synthesis_instruction = if plan.synthesize {
            format!(
                "Synthesize the remaining {} articles into a concise overview with bullet points.",
                count.saturating_sub(plan.keep_count)
            )
        } else {
            "Leave out the least substantive article; do not write a synthesis.".to_string()
        };
        let articles = format_article_block(&cluster.articles, PROMPT_CONTENT_CHARS);
        let article_count = count.to_string();
        let keep_count = plan.keep_count.to_string();
        let prompt = self.prompts.render(
            PromptKey::ClusterCuration,
            &[
                ("label", label.as_str()),
                ("article_count", article_count.as_str()),
                ("strategy", plan.strategy.as_str()),
                ("strategy_description", plan.description),
                ("keep_count", keep_count.as_str()),
                ("synthesis_instruction", synthesis_instruction.as_str()),
                ("articles", articles.as_str()),
            ],
        )?;

        tracing::info!(
            cluster = %label,
            articles = count,
            strategy = %plan.strategy,
            keep = plan.keep_count,
            "Curating cluster"
        );

        let content = self
            .generate(&prompt, &format!("curate '{label}'"))
            .await
            .map_err(|(attempts, source)| CurationError::Cluster {
                label: label.clone(),
                attempts,
                source,
            })?;

        Ok(CuratedCluster {
            label,
            original_article_count: count,
            curated_content: Some(content),
            strategy: plan.strategy,
        })
    }

    /// Curate the merged miscellaneous cluster.
    pub async fn curate_misc(&self, cluster: &Cluster) -> Result<CuratedCluster, CurationError> {
        let label = cluster.display_label();
        let count = cluster.len();

        if count == 0 {
            return Ok(CuratedCluster {
                label,
                original_article_count: 0,
                curated_content: Some(String::new()),
                strategy: CurationStrategy::Misc,
            });
        }
        if count <= MISC_PASSTHROUGH_MAX {
            return Ok(CuratedCluster {
                label,
                original_article_count: count,
                curated_content: None,
                strategy: CurationStrategy::Passthrough,
            });
        }

        let articles = format_article_block(&cluster.articles, PROMPT_CONTENT_CHARS);
        let article_count = count.to_string();
        let prompt = self.prompts.render(
            PromptKey::MiscCuration,
            &[
                ("label", label.as_str()),
                ("article_count", article_count.as_str()),
                ("articles", articles.as_str()),
            ],
        )?;

        tracing::info!(articles = count, "Curating miscellaneous cluster");

        let content = self
            .generate(&prompt, "curate miscellaneous")
            .await
            .map_err(|(attempts, source)| CurationError::Miscellaneous { attempts, source })?;

        Ok(CuratedCluster {
            label,
            original_article_count: count,
            curated_content: Some(content),
            strategy: CurationStrategy::Misc,
        })
    }

    /// Curate every cluster concurrently, preserving input order.
    ///
    /// The first failure aborts the phase; calls still in flight are dropped.
    pub async fn curate_all(
        &self,
        clusters: &[Cluster],
    ) -> Result<Vec<CuratedCluster>, CurationError> {
        try_join_all(clusters.iter().map(|cluster| async move {
            match cluster.cluster_type {
                ClusterType::Main => self.curate(cluster).await,
                ClusterType::Miscellaneous => self.curate_misc(cluster).await,
            }
        }))
        .await
    }

    /// Write an isolated summary of `cluster`, leaving out any article in `featured`.
    ///
    /// Returns `None` without calling the generator when nothing remains after exclusion.
    pub async fn summarize_cluster(
        &self,
        cluster: &Cluster,
        featured: &HashSet<String>,
    ) -> Result<Option<ClusterSummary>, CurationError> {
        let isolated = exclude_articles(cluster, featured);
        let label = isolated.display_label();
        if isolated.is_empty() {
            tracing::debug!(cluster = %label, "Every article already featured; skipping summary");
            return Ok(None);
        }

        let count = isolated.len();
        let articles = format_article_block(&isolated.articles, PROMPT_CONTENT_CHARS);
        let article_count = count.to_string();
        let prompt = self.prompts.render(
            PromptKey::ClusterSummary,
            &[
                ("label", label.as_str()),
                ("article_count", article_count.as_str()),
                ("articles", articles.as_str()),
            ],
        )?;

        tracing::info!(
            cluster = %label,
            articles = count,
            excluded = cluster.len() - count,
            "Summarizing cluster"
        );

        let content = self
            .generate(&prompt, &format!("summarize '{label}'"))
            .await
            .map_err(|(attempts, source)| CurationError::Cluster {
                label: label.clone(),
                attempts,
                source,
            })?;

        Ok(Some(ClusterSummary {
            label,
            article_count: count,
            content,
        }))
    }

    /// Summarize every cluster concurrently; clusters left empty produce no entry.
    pub async fn summarize_all(
        &self,
        clusters: &[Cluster],
        featured: &HashSet<String>,
    ) -> Result<Vec<ClusterSummary>, CurationError> {
        let summaries = try_join_all(
            clusters
                .iter()
                .map(|cluster| self.summarize_cluster(cluster, featured)),
        )
        .await?;
        Ok(summaries.into_iter().flatten().collect())
    }

    async fn generate(&self, prompt: &str, label: &str) -> Result<String, (u32, GenerationError)> {
        retry_with_backoff(&self.retry, label, || self.generator.generate(prompt))
            .await
            .map_err(|exhausted| (exhausted.attempts, exhausted.last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Article;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        fail_when_contains: Option<&'static str>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            if let Some(marker) = self.fail_when_contains {
                if prompt.contains(marker) {
                    return Err(GenerationError::GenerationFailed("rate limited".into()));
                }
            }
            Ok(format!("curated #{}", prompt.len()))
        }
    }

    fn curator(generator: Arc<RecordingGenerator>) -> ClusterCurator {
        ClusterCurator::new(
            generator,
            Arc::new(PromptTemplates::builtin()),
            RetryPolicy::new(3, Duration::ZERO),
        )
    }

    fn cluster(id: usize, cluster_type: ClusterType, prefix: &str, size: usize) -> Cluster {
        Cluster {
            id,
            original_id: id,
            articles: (0..size)
                .map(|i| {
                    Article::new(
                        "src",
                        format!("{prefix} story {i}"),
                        "2025-01-01T00:00:00Z",
                        format!("{prefix}-body-{i}"),
                        vec![],
                    )
                })
                .collect(),
            centroid: None,
            cluster_type,
            label: Some(format!("{prefix} label")),
        }
    }

    #[tokio::test]
    async fn passthrough_makes_no_call() {
        let generator = Arc::new(RecordingGenerator::default());
        let result = curator(generator.clone())
            .curate(&cluster(0, ClusterType::Main, "tiny", 2))
            .await
            .expect("curated");

        assert_eq!(result.strategy, CurationStrategy::Passthrough);
        assert!(result.curated_content.is_none());
        assert!(generator.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn heavy_cluster_prompt_carries_strategy_and_keep_count() {
        let generator = Arc::new(RecordingGenerator::default());
        let result = curator(generator.clone())
            .curate(&cluster(0, ClusterType::Main, "big", 35))
            .await
            .expect("curated");

        assert_eq!(result.strategy, CurationStrategy::Heavy);
        assert_eq!(result.original_article_count, 35);
        assert!(result.curated_content.is_some());

        let prompts = generator.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Strategy: heavy"));
        assert!(prompts[0].contains("Keep the 2 most substantive"));
        assert!(prompts[0].contains("remaining 33 articles"));
    }

    #[tokio::test]
    async fn each_call_sees_only_its_own_cluster() {
        let generator = Arc::new(RecordingGenerator::default());
        let clusters = vec![
            cluster(0, ClusterType::Main, "alpha", 5),
            cluster(1, ClusterType::Main, "beta", 12),
            cluster(2, ClusterType::Miscellaneous, "gamma", 6),
        ];

        let curated = curator(generator.clone())
            .curate_all(&clusters)
            .await
            .expect("curated");

        assert_eq!(curated.len(), 3);
        assert_eq!(curated[0].label, "alpha label");
        assert_eq!(curated[2].strategy, CurationStrategy::Misc);

        let prompts = generator.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 3);
        for prompt in prompts.iter() {
            let owners: Vec<&str> = ["alpha-body", "beta-body", "gamma-body"]
                .into_iter()
                .filter(|marker| prompt.contains(marker))
                .collect();
            assert_eq!(owners.len(), 1, "prompt mixes clusters: {owners:?}");
        }
    }

    #[tokio::test]
    async fn one_failed_cluster_fails_the_phase() {
        let generator = Arc::new(RecordingGenerator {
            fail_when_contains: Some("beta-body"),
            ..Default::default()
        });
        let clusters = vec![
            cluster(0, ClusterType::Main, "alpha", 5),
            cluster(1, ClusterType::Main, "beta", 5),
        ];

        let error = curator(generator.clone())
            .curate_all(&clusters)
            .await
            .expect_err("phase fails");

        match error {
            CurationError::Cluster { label, attempts, .. } => {
                assert_eq!(label, "beta label");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn misc_cluster_thresholds() {
        let generator = Arc::new(RecordingGenerator::default());
        let curator = curator(generator.clone());

        let empty = curator
            .curate_misc(&cluster(5, ClusterType::Miscellaneous, "m", 0))
            .await
            .expect("empty");
        assert_eq!(empty.original_article_count, 0);
        assert_eq!(empty.curated_content.as_deref(), Some(""));

        let small = curator
            .curate_misc(&cluster(5, ClusterType::Miscellaneous, "m", 3))
            .await
            .expect("small");
        assert_eq!(small.strategy, CurationStrategy::Passthrough);
        assert!(generator.prompts.lock().expect("lock").is_empty());

        let large = curator
            .curate_misc(&cluster(5, ClusterType::Miscellaneous, "m", 4))
            .await
            .expect("large");
        assert_eq!(large.strategy, CurationStrategy::Misc);
        assert_eq!(generator.prompts.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn misc_prompt_uses_the_cluster_label() {
        let generator = Arc::new(RecordingGenerator::default());
        let mut odds = cluster(4, ClusterType::Miscellaneous, "odd", 4);
        odds.label = Some("Odds and Ends".into());

        let curated = curator(generator.clone())
            .curate_misc(&odds)
            .await
            .expect("curated");

        assert_eq!(curated.label, "Odds and Ends");
        let prompts = generator.prompts.lock().expect("lock");
        assert!(prompts[0].contains("the \"Odds and Ends\" section"));
        assert!(!prompts[0].contains("Other News"));
    }

    #[tokio::test]
    async fn summary_excludes_featured_articles_before_formatting() {
        let generator = Arc::new(RecordingGenerator::default());
        let source = cluster(0, ClusterType::Main, "topic", 3);
        let featured: HashSet<String> = [source.articles[1].id.clone()].into_iter().collect();

        let summary = curator(generator.clone())
            .summarize_cluster(&source, &featured)
            .await
            .expect("summary")
            .expect("non-empty");

        assert_eq!(summary.article_count, 2);
        assert_eq!(source.len(), 3, "original cluster is untouched");
        let prompts = generator.prompts.lock().expect("lock");
        assert!(prompts[0].contains("topic-body-0"));
        assert!(!prompts[0].contains("topic-body-1"));
        assert!(prompts[0].contains("topic-body-2"));
    }

    #[tokio::test]
    async fn fully_featured_cluster_is_skipped() {
        let generator = Arc::new(RecordingGenerator::default());
        let source = cluster(0, ClusterType::Main, "topic", 2);
        let featured: HashSet<String> = source.articles.iter().map(|a| a.id.clone()).collect();

        let summaries = curator(generator.clone())
            .summarize_all(&[source], &featured)
            .await
            .expect("ok");
        assert!(summaries.is_empty());
        assert!(generator.prompts.lock().expect("lock").is_empty());
    }
}
