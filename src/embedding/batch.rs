//! Batched, rate-limited embedding of articles with batch-granular failure tracking.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{EmbeddingClient, EmbeddingClientError};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::types::{Article, EmbeddedArticle};

/// Batching, truncation, and validation knobs for [`ArticleEmbedder`].
#[derive(Debug, Clone)]
pub struct EmbedderSettings {
    /// Articles per upstream request.
    pub batch_size: usize,
    /// Character budget per article; a conservative proxy for the token limit.
    pub max_chars: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Expected vector dimension, when known up front.
    pub expected_dimension: Option<usize>,
    /// Retry schedule applied to each batch.
    pub retry: RetryPolicy,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_chars: 8000,
            batch_delay: Duration::from_millis(500),
            expected_dimension: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Raised when no batch could be embedded at all.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Every batch exhausted its retries.
    #[error(
        "all {batches} embedding batches failed; {} articles left unembedded",
        failed_ids.len()
    )]
    Exhausted {
        /// Number of batches attempted.
        batches: usize,
        /// Ids of every article that could not be embedded.
        failed_ids: Vec<String>,
    },
}

/// Successful embeddings plus the ids of articles whose batch failed.
#[derive(Debug, Clone, Default)]
pub struct EmbedOutcome {
    /// Embedded articles in input order.
    pub embedded: Vec<EmbeddedArticle>,
    /// Ids of articles belonging to failed batches.
    pub failed_ids: Vec<String>,
    /// Number of batches that exhausted their retries.
    pub failed_batches: usize,
}

/// Text submitted for an article: subject and content, truncated to `max_chars` characters.
pub fn embedding_input(article: &Article, max_chars: usize) -> String {
    let text = format!("{}\n\n{}", article.subject, article.content);
    if text.chars().count() <= max_chars {
        return text;
    }
    text.chars().take(max_chars).collect()
}

/// Turns articles into [`EmbeddedArticle`]s through an injected [`EmbeddingClient`].
pub struct ArticleEmbedder {
    client: Arc<dyn EmbeddingClient>,
    settings: EmbedderSettings,
}

impl ArticleEmbedder {
    /// Create an embedder over the given client.
    pub fn new(client: Arc<dyn EmbeddingClient>, settings: EmbedderSettings) -> Self {
        Self { client, settings }
    }

    /// Embed every article, batch by batch.
    ///
    /// A batch that exhausts its retries is recorded as failed in its entirety and processing
    /// continues. Only when every batch fails does this return [`EmbeddingError::Exhausted`].
    pub async fn embed(&self, articles: &[Article]) -> Result<EmbedOutcome, EmbeddingError> {
        let mut outcome = EmbedOutcome::default();
        if articles.is_empty() {
            return Ok(outcome);
        }

        let batch_size = self.settings.batch_size.max(1);
        let batches: Vec<&[Article]> = articles.chunks(batch_size).collect();
        let total = batches.len();
        let mut dimension = self.settings.expected_dimension;

        tracing::info!(
            articles = articles.len(),
            batches = total,
            batch_size,
            "Embedding articles"
        );

        for (index, batch) in batches.iter().enumerate() {
            let texts: Vec<String> = batch
                .iter()
                .map(|article| embedding_input(article, self.settings.max_chars))
                .collect();

            let label = format!("embedding batch {}/{}", index + 1, total);
            let result = retry_with_backoff(&self.settings.retry, &label, || {
                let texts = texts.clone();
                async move {
                    let vectors = self.client.generate_embeddings(texts).await?;
                    validate_batch(&vectors, batch.len(), dimension)?;
                    Ok::<_, EmbeddingClientError>(vectors)
                }
            })
            .await;

            match result {
                Ok(vectors) => {
                    if dimension.is_none() {
                        dimension = vectors.first().map(Vec::len);
                    }
                    tracing::debug!(batch = index + 1, size = batch.len(), "Embedded batch");
                    outcome.embedded.extend(batch.iter().zip(vectors).map(
                        |(article, embedding)| EmbeddedArticle {
                            article: article.clone(),
                            embedding,
                        },
                    ));
                }
                Err(exhausted) => {
                    let ids: Vec<String> = batch.iter().map(|article| article.id.clone()).collect();
                    tracing::warn!(
                        batch = index + 1,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        failed_ids = ?ids,
                        "Embedding batch failed"
                    );
                    outcome.failed_ids.extend(ids);
                    outcome.failed_batches += 1;
                }
            }

            if index + 1 < total && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        if outcome.embedded.is_empty() {
            return Err(EmbeddingError::Exhausted {
                batches: total,
                failed_ids: outcome.failed_ids,
            });
        }

        if !outcome.failed_ids.is_empty() {
            tracing::warn!(
                embedded = outcome.embedded.len(),
                failed = outcome.failed_ids.len(),
                "Proceeding with partial embeddings"
            );
        }

        Ok(outcome)
    }
}

fn validate_batch(
    vectors: &[Vec<f32>],
    expected_count: usize,
    expected_dimension: Option<usize>,
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }
    let reference = expected_dimension.or_else(|| vectors.first().map(Vec::len));
    if let Some(expected) = reference {
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "embedding dimension mismatch: expected {expected}, got {}",
                bad.len()
            )));
        }
    }
    Ok(())
}
