use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    articles_embedded: AtomicU64,
    articles_failed: AtomicU64,
    batches_failed: AtomicU64,
    clusters_formed: AtomicU64,
    generation_calls: AtomicU64,
    generation_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of an embedding pass.
    pub fn record_embedding(&self, embedded: u64, failed: u64, failed_batches: u64) {
        self.articles_embedded.fetch_add(embedded, Ordering::Relaxed);
        self.articles_failed.fetch_add(failed, Ordering::Relaxed);
        self.batches_failed
            .fetch_add(failed_batches, Ordering::Relaxed);
    }

    /// Record the number of clusters produced by a clustering pass.
    pub fn record_clusters(&self, count: u64) {
        self.clusters_formed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one text-generation call and whether it succeeded.
    pub fn record_generation_call(&self, succeeded: bool) {
        self.generation_calls.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.generation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            articles_embedded: self.articles_embedded.load(Ordering::Relaxed),
            articles_failed: self.articles_failed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            clusters_formed: self.clusters_formed.load(Ordering::Relaxed),
            generation_calls: self.generation_calls.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Articles that received an embedding.
    pub articles_embedded: u64,
    /// Articles left out because their batch failed.
    pub articles_failed: u64,
    /// Embedding batches that exhausted their retries.
    pub batches_failed: u64,
    /// Clusters produced by partitioning.
    pub clusters_formed: u64,
    /// Text-generation calls issued, including retries.
    pub generation_calls: u64,
    /// Text-generation calls that returned an error.
    pub generation_failures: u64,
}
