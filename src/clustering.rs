//! Dimensionality reduction and clustering used for latent topic discovery.
//!
//! PCA runs power iteration on the sample Gram matrix (`X·Xᵀ`) without
//! materialising it, which keeps the cost at `O(n·d)` per iteration for
//! high-dimensional embeddings. K-means uses a seeded farthest-point
//! initialisation so identical inputs always produce identical labels.

const POWER_ITERATIONS: usize = 100;
const POWER_TOLERANCE: f32 = 1e-6;
const KMEANS_MAX_ITER: usize = 300;

/// Projects `samples` onto their top `n_components` principal components.
///
/// Returns one row per sample. Components with (numerically) zero variance
/// are left as zero columns.
pub fn pca(samples: &[Vec<f32>], n_components: usize) -> Vec<Vec<f32>> {
    let n = samples.len();
    if n == 0 || n_components == 0 {
        return Vec::new();
    }
    let dim = samples[0].len();

    let mut mean = vec![0.0f32; dim];
    for sample in samples {
        for (m, x) in mean.iter_mut().zip(sample) {
            *m += x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n as f32);
    let centered: Vec<Vec<f32>> = samples
        .iter()
        .map(|s| s.iter().zip(&mean).map(|(x, m)| x - m).collect())
        .collect();

    let mut scores = vec![vec![0.0f32; n_components]; n];
    let mut basis: Vec<Vec<f32>> = Vec::with_capacity(n_components);

    for component in 0..n_components.min(n) {
        let mut u: Vec<f32> = (0..n).map(|i| 1.0 + ((i + component) % 7) as f32 * 0.1).collect();
        orthogonalize(&mut u, &basis);
        if normalize(&mut u) == 0.0 {
            break;
        }

        let mut eigenvalue = 0.0;
        for _ in 0..POWER_ITERATIONS {
            let mut next = gram_product(&centered, &u);
            orthogonalize(&mut next, &basis);
            eigenvalue = normalize(&mut next);
            if eigenvalue == 0.0 {
                break;
            }
            let delta: f32 = next.iter().zip(&u).map(|(a, b)| (a - b).abs()).sum();
            u = next;
            if delta < POWER_TOLERANCE {
                break;
            }
        }
        if eigenvalue <= f32::EPSILON {
            break;
        }

        let sigma = eigenvalue.sqrt();
        for (row, ui) in scores.iter_mut().zip(&u) {
            row[component] = ui * sigma;
        }
        basis.push(u);
    }

    scores
}

/// Computes `X·(Xᵀ·u)` for row-major `x`.
fn gram_product(x: &[Vec<f32>], u: &[f32]) -> Vec<f32> {
    let dim = x.first().map_or(0, Vec::len);
    let mut projected = vec![0.0f32; dim];
    for (row, ui) in x.iter().zip(u) {
        for (p, v) in projected.iter_mut().zip(row) {
            *p += v * ui;
        }
    }
    x.iter()
        .map(|row| row.iter().zip(&projected).map(|(a, b)| a * b).sum())
        .collect()
}

fn orthogonalize(v: &mut [f32], basis: &[Vec<f32>]) {
    for b in basis {
        let dot: f32 = v.iter().zip(b).map(|(x, y)| x * y).sum();
        for (x, y) in v.iter_mut().zip(b) {
            *x -= dot * y;
        }
    }
}

/// Scales `v` to unit length and returns its previous norm.
fn normalize(v: &mut [f32]) -> f32 {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    norm
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Lloyd's k-means. Returns a cluster label in `0..k` for every point.
pub fn kmeans(points: &[Vec<f32>], k: usize, seed: u64) -> Vec<usize> {
    let n = points.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let k = k.min(n);

    let mut centroids = init_centroids(points, k, seed);
    let mut labels = vec![0usize; n];

    for iteration in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (label, point) in labels.iter_mut().zip(points) {
            let nearest = nearest_centroid(point, &centroids);
            if nearest != *label {
                *label = nearest;
                changed = true;
            }
        }
        if iteration > 0 && !changed {
            break;
        }

        let dim = points[0].len();
        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (label, point) in labels.iter().zip(points) {
            counts[*label] += 1;
            for (s, x) in sums[*label].iter_mut().zip(point) {
                *s += x;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(&counts) {
            if *count > 0 {
                *centroid = sum.into_iter().map(|s| s / *count as f32).collect();
            }
        }
    }

    labels
}

/// First centroid is picked by `seed`; each next one is the point farthest
/// from all centroids chosen so far.
fn init_centroids(points: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let first = (seed % points.len() as u64) as usize;
    let mut centroids = vec![points[first].clone()];
    let mut min_dist: Vec<f32> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let (farthest, _) = min_dist
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, d)| if *d > best.1 { (i, *d) } else { best });
        let centroid = points[farthest].clone();
        for (d, p) in min_dist.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f32::MAX), |best, (i, d)| if d < best.1 { (i, d) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.1, 0.0],
            vec![0.1, 0.0, 0.0],
            vec![0.0, 0.0, 0.1],
            vec![5.0, 5.1, 5.0],
            vec![5.1, 5.0, 5.0],
            vec![5.0, 5.0, 5.1],
        ]
    }

    #[test]
    fn pca_keeps_sample_count_and_requested_width() {
        let reduced = pca(&blobs(), 2);
        assert_eq!(reduced.len(), 6);
        assert!(reduced.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn first_component_separates_blobs() {
        let reduced = pca(&blobs(), 1);
        let left: Vec<f32> = reduced[..3].iter().map(|r| r[0]).collect();
        let right: Vec<f32> = reduced[3..].iter().map(|r| r[0]).collect();
        // Same sign within a blob, opposite sign across blobs.
        assert!(left.iter().all(|x| x.signum() == left[0].signum()));
        assert!(right.iter().all(|x| x.signum() == right[0].signum()));
        assert_ne!(left[0].signum(), right[0].signum());
    }

    #[test]
    fn kmeans_finds_two_blobs() {
        let labels = kmeans(&blobs(), 2, 42);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn kmeans_is_deterministic_for_a_seed() {
        let points = pca(&blobs(), 2);
        assert_eq!(kmeans(&points, 3, 7), kmeans(&points, 3, 7));
    }

    #[test]
    fn kmeans_caps_clusters_at_sample_count() {
        let labels = kmeans(&blobs()[..2], 8, 42);
        assert!(labels.iter().all(|l| *l < 2));
    }
}
