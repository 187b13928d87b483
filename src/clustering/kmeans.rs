//! Lloyd's k-means with deterministic k-means++ style seeding.
//!
//! Callers are expected to L2-normalize their vectors first so that squared Euclidean distance
//! ranks pairs the same way cosine similarity does.

/// Outcome of a k-means run.
#[derive(Debug, Clone)]
pub(crate) struct KMeansResult {
    /// Raw partition label per input vector.
    pub assignments: Vec<usize>,
    /// One centroid per partition label.
    pub centroids: Vec<Vec<f32>>,
    /// Iterations executed.
    pub iterations: usize,
    /// Whether assignments stabilized before the cap.
    pub converged: bool,
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
pub(crate) fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|value| value / norm).collect()
    } else {
        vector.to_vec()
    }
}

#[inline]
pub(crate) fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Partition `vectors` into at most `k` groups.
///
/// Requires `0 < k <= vectors.len()`.
pub(crate) fn kmeans(vectors: &[Vec<f32>], k: usize, max_iterations: usize) -> KMeansResult {
    let mut centroids = seed_centroids(vectors, k);
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iterations {
        iterations += 1;

        let mut changed = false;
        for (index, vector) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(vector, &centroids);
            if assignments[index] != nearest {
                assignments[index] = nearest;
                changed = true;
            }
        }

        if !changed {
            converged = true;
            break;
        }

        centroids = recompute_centroids(vectors, &assignments, &centroids);
    }

    KMeansResult {
        assignments,
        centroids,
        iterations,
        converged,
    }
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}

/// Seed with the first point, then repeatedly take the point farthest from every chosen seed.
///
/// This is the deterministic limit of k-means++ sampling (always picking the maximum-weight
/// point), which keeps identical inputs producing identical partitions.
fn seed_centroids(vectors: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(vectors[0].clone());
    let mut min_distances: Vec<f32> = vectors
        .iter()
        .map(|vector| squared_distance(vector, &vectors[0]))
        .collect();

    while centroids.len() < k {
        let mut farthest = None;
        let mut farthest_distance = 0.0f32;
        for (index, distance) in min_distances.iter().enumerate() {
            if *distance > farthest_distance {
                farthest_distance = *distance;
                farthest = Some(index);
            }
        }

        // Every remaining point coincides with a seed; duplicate seeds end up empty.
        let chosen = farthest.unwrap_or(centroids.len() % vectors.len());
        let seed = vectors[chosen].clone();
        for (index, vector) in vectors.iter().enumerate() {
            let distance = squared_distance(vector, &seed);
            if distance < min_distances[index] {
                min_distances[index] = distance;
            }
        }
        centroids.push(seed);
    }

    centroids
}

/// Mean of each partition; an empty partition keeps its previous centroid.
fn recompute_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    previous: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    let mut sums = vec![vec![0.0f32; dimension]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (vector, &cluster) in vectors.iter().zip(assignments) {
        counts[cluster] += 1;
        for (sum, value) in sums[cluster].iter_mut().zip(vector) {
            *sum += value;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((mut sum, count), old)| {
            if count == 0 {
                return old.clone();
            }
            for value in &mut sum {
                *value /= count as f32;
            }
            sum
        })
        .collect()
}
