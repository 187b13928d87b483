//! Core data types shared by every stage of the digest pipeline.
//!
//! All values are created within a single pipeline run. They are immutable once handed to the
//! next stage; stages that need a narrower view (for example excluding featured articles from a
//! cluster) build a filtered copy instead of mutating in place.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Number of leading clusters (by descending size) typed as [`ClusterType::Main`].
pub const MAIN_THRESHOLD: usize = 5;

/// Hyperlink extracted from an article body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Anchor text as it appeared in the source.
    pub text: String,
    /// Target URL; unique within an article.
    pub url: String,
}

/// A single source document after upstream cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Stable identifier derived from source, subject, and timestamp.
    pub id: String,
    /// Publisher or sender name.
    pub source: String,
    /// Headline or subject line.
    pub subject: String,
    /// RFC 3339 timestamp supplied by the upstream fetcher.
    pub timestamp: String,
    /// Plain-text body.
    pub content: String,
    /// Links in document order, deduplicated by URL.
    pub links: Vec<Link>,
    /// Whitespace-delimited word count of `content`.
    pub word_count: usize,
}

impl Article {
    /// Build an article, deriving its id and word count and deduplicating links by URL.
    pub fn new(
        source: impl Into<String>,
        subject: impl Into<String>,
        timestamp: impl Into<String>,
        content: impl Into<String>,
        links: Vec<Link>,
    ) -> Self {
        let source = source.into();
        let subject = subject.into();
        let timestamp = timestamp.into();
        let content = content.into();

        let id = compute_article_id(&source, &subject, &timestamp);
        let word_count = content.split_whitespace().count();

        let mut seen = HashSet::new();
        let links = links
            .into_iter()
            .filter(|link| seen.insert(link.url.clone()))
            .collect();

        Self {
            id,
            source,
            subject,
            timestamp,
            content,
            links,
            word_count,
        }
    }
}

/// Hash `source|subject|timestamp` into a short hex identifier.
pub fn compute_article_id(source: &str, subject: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(subject.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// An article paired with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedArticle {
    /// The embedded article.
    pub article: Article,
    /// Model-defined vector; dimension is constant within a run.
    pub embedding: Vec<f32>,
}

/// Positional classification of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    /// One of the largest [`MAIN_THRESHOLD`] clusters.
    Main,
    /// Any cluster ranked after the main clusters.
    Miscellaneous,
}

impl ClusterType {
    /// Classify a cluster by its 0-based rank.
    pub fn for_rank(rank: usize) -> Self {
        if rank < MAIN_THRESHOLD {
            Self::Main
        } else {
            Self::Miscellaneous
        }
    }
}

/// A topic group produced by the clusterer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Dense 0-based rank after sorting by descending size.
    pub id: usize,
    /// Raw partition label before sorting.
    pub original_id: usize,
    /// Member articles in input order.
    pub articles: Vec<Article>,
    /// Mean of the members' normalized embeddings, when partitioning ran.
    pub centroid: Option<Vec<f32>>,
    /// Main or miscellaneous, by rank.
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    /// Human-readable topic label, once generated.
    pub label: Option<String>,
}

impl Cluster {
    /// Label to display, falling back to the positional name.
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("Topic {}", self.id + 1))
    }

    /// Number of member articles.
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    /// Whether the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Output of the clusterer: the clusters plus the per-input assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clustering {
    /// Clusters ordered by rank.
    pub clusters: Vec<Cluster>,
    /// For each input position, the `id` of the cluster it landed in.
    pub assignments: Vec<usize>,
}

/// Curation strategy applied to one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurationStrategy {
    /// No synthesis; the caller renders the articles directly.
    Passthrough,
    /// Keep all but one article verbatim.
    Light,
    /// Keep a handful verbatim and synthesize the rest.
    Moderate,
    /// Keep two verbatim and synthesize the rest.
    Heavy,
    /// Single synthesis over the merged miscellaneous cluster.
    Misc,
}

impl CurationStrategy {
    /// Lowercase name used in prompts and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Heavy => "heavy",
            Self::Misc => "misc",
        }
    }
}

impl std::fmt::Display for CurationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of curating a single cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedCluster {
    /// Topic label of the source cluster.
    pub label: String,
    /// Member count before curation.
    pub original_article_count: usize,
    /// Generated content; `None` only for passthrough.
    pub curated_content: Option<String>,
    /// Strategy that produced this result.
    pub strategy: CurationStrategy,
}

/// Which parsing tier produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Pool was small enough that every article was returned without a call.
    Exhaustive,
    /// Indices came from a JSON object in the response.
    ParsedJson,
    /// Indices came from bare integers in the response.
    ParsedIntegers,
    /// Deterministic word-count ordering.
    Fallback,
}

/// Bounded subset of articles chosen for featured treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Selected articles in ranked order.
    pub selected: Vec<Article>,
    /// Model rationale or a fixed explanation.
    pub reasoning: String,
    /// Provenance of the selection.
    pub method: SelectionMethod,
}

impl Selection {
    /// Ids of the selected articles.
    pub fn article_ids(&self) -> HashSet<String> {
        self.selected.iter().map(|article| article.id.clone()).collect()
    }
}
