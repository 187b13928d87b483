//! Topic clustering over article embeddings.
//!
//! Embeddings are L2-normalized before partitioning so that Euclidean k-means behaves like a
//! cosine-similarity grouping. Partitions are then re-ranked by descending size (ties broken by
//! raw label), re-indexed densely, and typed main or miscellaneous purely by rank.

mod kmeans;
mod label;

pub use label::generate_cluster_label;

use std::collections::{BTreeMap, HashMap};

use crate::types::{Article, Cluster, ClusterType, Clustering, EmbeddedArticle};

/// Iteration cap for the partitioning loop.
pub const MAX_ITERATIONS: usize = 100;

/// Label given to the merged miscellaneous cluster.
pub const MISC_LABEL: &str = "Other News";

/// Group embedded articles into at most `k` topic clusters.
///
/// - Empty input or `k == 0` yields no clusters.
/// - With `len(embedded) <= k` every article becomes its own cluster, in input order.
/// - Otherwise k-means runs over normalized vectors; partitions left empty are dropped, so the
///   result may hold fewer than `k` clusters.
pub fn cluster(embedded: &[EmbeddedArticle], k: usize) -> Clustering {
    if embedded.is_empty() || k == 0 {
        return Clustering::default();
    }

    if embedded.len() <= k {
        tracing::debug!(
            articles = embedded.len(),
            k,
            "Too few articles to partition; using singleton clusters"
        );
        let clusters = embedded
            .iter()
            .enumerate()
            .map(|(index, item)| Cluster {
                id: index,
                original_id: index,
                articles: vec![item.article.clone()],
                centroid: None,
                cluster_type: ClusterType::for_rank(index),
                label: None,
            })
            .collect();
        return Clustering {
            clusters,
            assignments: (0..embedded.len()).collect(),
        };
    }

    let vectors: Vec<Vec<f32>> = embedded
        .iter()
        .map(|item| kmeans::l2_normalize(&item.embedding))
        .collect();
    let result = kmeans::kmeans(&vectors, k, MAX_ITERATIONS);

    let mut partitions: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, &label) in result.assignments.iter().enumerate() {
        partitions.entry(label).or_default().push(index);
    }

    // BTreeMap yields ascending raw labels, so a stable sort on size keeps the tie-break.
    let mut ranked: Vec<(usize, Vec<usize>)> = partitions.into_iter().collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut assignments = vec![0usize; embedded.len()];
    let clusters: Vec<Cluster> = ranked
        .into_iter()
        .enumerate()
        .map(|(rank, (original_id, members))| {
            for &member in &members {
                assignments[member] = rank;
            }
            Cluster {
                id: rank,
                original_id,
                articles: members
                    .iter()
                    .map(|&member| embedded[member].article.clone())
                    .collect(),
                centroid: result.centroids.get(original_id).cloned(),
                cluster_type: ClusterType::for_rank(rank),
                label: None,
            }
        })
        .collect();

    tracing::info!(
        articles = embedded.len(),
        k,
        clusters = clusters.len(),
        iterations = result.iterations,
        converged = result.converged,
        "Clustered articles"
    );

    Clustering {
        clusters,
        assignments,
    }
}

/// Attach a generated label to every cluster.
pub fn label_clusters(clusters: Vec<Cluster>) -> Vec<Cluster> {
    clusters
        .into_iter()
        .map(|cluster| {
            let label = generate_cluster_label(&cluster);
            Cluster {
                label: Some(label),
                ..cluster
            }
        })
        .collect()
}

/// Collapse every miscellaneous cluster into one, placed right after the main clusters.
///
/// Returns the input unchanged when there is nothing to merge.
pub fn merge_miscellaneous_clusters(clusters: Vec<Cluster>) -> Vec<Cluster> {
    if !clusters
        .iter()
        .any(|cluster| cluster.cluster_type == ClusterType::Miscellaneous)
    {
        return clusters;
    }

    let (mut main, misc): (Vec<Cluster>, Vec<Cluster>) = clusters
        .into_iter()
        .partition(|cluster| cluster.cluster_type == ClusterType::Main);

    let original_id = misc.first().map(|cluster| cluster.original_id).unwrap_or(0);
    let articles: Vec<Article> = misc.into_iter().flat_map(|cluster| cluster.articles).collect();

    main.push(Cluster {
        id: main.len(),
        original_id,
        articles,
        centroid: None,
        cluster_type: ClusterType::Miscellaneous,
        label: Some(MISC_LABEL.to_string()),
    });
    main
}

/// Cosine similarity of two vectors; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// The `count` members closest to the cluster centroid, most similar first.
///
/// Returns every member when the cluster has no centroid or at most `count` members. Ties keep
/// the cluster's article order.
pub fn find_representative_articles(
    cluster: &Cluster,
    embedded: &[EmbeddedArticle],
    count: usize,
) -> Vec<Article> {
    let Some(centroid) = cluster.centroid.as_deref() else {
        return cluster.articles.clone();
    };
    if cluster.articles.len() <= count {
        return cluster.articles.clone();
    }

    let vectors: HashMap<&str, &[f32]> = embedded
        .iter()
        .map(|item| (item.article.id.as_str(), item.embedding.as_slice()))
        .collect();

    let mut scored: Vec<(f32, &Article)> = cluster
        .articles
        .iter()
        .map(|article| {
            let similarity = vectors
                .get(article.id.as_str())
                .map(|vector| cosine_similarity(vector, centroid))
                .unwrap_or(f32::NEG_INFINITY);
            (similarity, article)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(count)
        .map(|(_, article)| article.clone())
        .collect()
}
