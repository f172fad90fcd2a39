//! K-Means clustering with seeded random restarts.
//!
//! Each restart draws its initial centroids from its own RNG stream derived
//! from the configured seed and the restart index, so the winning run does
//! not depend on how rayon schedules the restarts.

use crate::error::{ReduceError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Configuration for K-Means.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Number of clusters (default: 7)
    pub n_clusters: usize,
    /// Random-init restarts; the lowest inertia wins (default: 100)
    pub n_init: usize,
    /// Maximum Lloyd iterations per restart (default: 300)
    pub max_iter: usize,
    /// Convergence tolerance relative to the mean feature variance (default: 1e-4)
    pub tol: f64,
    /// Base seed for the restart RNG streams (default: 6)
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 7,
            n_init: 100,
            max_iter: 300,
            tol: 1e-4,
            seed: 6,
        }
    }
}

impl KMeansConfig {
    /// Same configuration with a different cluster count.
    #[must_use]
    pub fn with_clusters(&self, n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..self.clone()
        }
    }

    /// Fit K-Means to the rows of `x`.
    ///
    /// # Errors
    /// Returns [`ReduceError::InvalidParameter`] for zero clusters or
    /// restarts and [`ReduceError::InsufficientData`] when there are fewer
    /// rows than clusters.
    pub fn fit(&self, x: &Array2<f64>) -> Result<FittedKMeans> {
        let k = self.n_clusters;
        if k == 0 || self.n_init == 0 {
            return Err(ReduceError::InvalidParameter(
                "n_clusters and n_init must be positive".to_string(),
            ));
        }
        if x.nrows() < k {
            return Err(ReduceError::InsufficientData {
                required: k,
                actual: x.nrows(),
            });
        }

        let tol = self.tol * mean_variance(x);
        let runs: Vec<FittedKMeans> = (0..self.n_init)
            .into_par_iter()
            .map(|run| {
                let seed = self.seed.wrapping_add((run as u64).wrapping_mul(STREAM_STRIDE));
                lloyd(x, k, self.max_iter, tol, seed)
            })
            .collect();

        let best = runs
            .into_iter()
            .reduce(|best, run| if run.inertia < best.inertia { run } else { best })
            .ok_or_else(|| ReduceError::InvalidParameter("no K-Means runs".to_string()))?;

        tracing::info!(
            clusters = k,
            restarts = self.n_init,
            inertia = best.inertia,
            iterations = best.n_iter,
            "fitted K-Means"
        );
        Ok(best)
    }
}

/// Fitted K-Means centroids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedKMeans {
    centroids: Array2<f64>,
    inertia: f64,
    n_iter: usize,
}

impl FittedKMeans {
    /// Cluster centroids (`n_clusters x n_features`).
    pub const fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Within-group sum of squared distances on the fitting data.
    pub const fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Lloyd iterations used by the winning restart.
    pub const fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Nearest-centroid label of every row of `x`.
    ///
    /// # Errors
    /// Returns [`ReduceError::DimensionMismatch`] when the column count
    /// differs from the centroids'.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<u32>> {
        if x.ncols() != self.centroids.ncols() {
            return Err(ReduceError::DimensionMismatch {
                expected: self.centroids.ncols(),
                actual: x.ncols(),
            });
        }
        Ok(x
            .axis_iter(Axis(0))
            .map(|row| nearest(row, &self.centroids).0 as u32)
            .collect())
    }
}

/// Within-group sum of squares of the best K-Means fit for `k = 1..=max_clusters`.
///
/// # Errors
/// Propagates fitting errors (for example fewer rows than `max_clusters`).
pub fn wgss_curve(
    x: &Array2<f64>,
    max_clusters: usize,
    config: &KMeansConfig,
) -> Result<Vec<(usize, f64)>> {
    (1..=max_clusters)
        .map(|k| Ok((k, config.with_clusters(k).fit(x)?.inertia())))
        .collect()
}

fn mean_variance(x: &Array2<f64>) -> f64 {
    x.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0)
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of and squared distance to the nearest centroid; ties go to the
/// lower index.
fn nearest(row: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .axis_iter(Axis(0))
        .map(|c| squared_distance(row, c))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
}

fn lloyd(x: &Array2<f64>, k: usize, max_iter: usize, tol: f64, seed: u64) -> FittedKMeans {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = x.nrows();
    let mut centroids = x.select(Axis(0), &rand::seq::index::sample(&mut rng, n, k).into_vec());
    let mut labels = vec![0usize; n];
    let mut distances = vec![0.0; n];
    let mut n_iter = 0;

    for iteration in 1..=max_iter.max(1) {
        n_iter = iteration;
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            (labels[i], distances[i]) = nearest(row, &centroids);
        }

        let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
        let mut counts = vec![0usize; k];
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let mut target = sums.row_mut(labels[i]);
            target += &row;
            counts[labels[i]] += 1;
        }

        let mut updated = sums;
        let mut farthest: Vec<usize> = (0..n).collect();
        farthest.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]).then(a.cmp(&b)));
        let mut relocations = farthest.into_iter();

        for (c, &count) in counts.iter().enumerate() {
            if count > 0 {
                let mut row = updated.row_mut(c);
                row /= count as f64;
            } else if let Some(point) = relocations.next() {
                updated.row_mut(c).assign(&x.row(point));
            }
        }

        let shift: f64 = (&updated - &centroids).mapv(|v| v * v).sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }

    let inertia = x
        .axis_iter(Axis(0))
        .map(|row| nearest(row, &centroids).1)
        .sum();

    FittedKMeans {
        centroids,
        inertia,
        n_iter,
    }
}

/// Row counts per cluster label.
pub fn cluster_sizes(labels: &[u32], n_clusters: usize) -> Array1<usize> {
    let mut sizes = Array1::<usize>::zeros(n_clusters);
    for &label in labels {
        if let Some(size) = sizes.get_mut(label as usize) {
            *size += 1;
        }
    }
    sizes
}
