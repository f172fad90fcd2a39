//! Principal component analysis.

use crate::error::{ReduceError, Result};
use crate::linalg::{covariance, jacobi_eigendecomp};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Configuration for PCA.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Number of components to keep
    pub n_components: usize,
    /// Maximum Jacobi sweeps (default: 100)
    pub max_sweeps: usize,
    /// Relative off-diagonal tolerance (default: 1e-12)
    pub tolerance: f64,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 50,
            max_sweeps: 100,
            tolerance: 1e-12,
        }
    }
}

impl PcaConfig {
    /// Config keeping `n_components` with default solver settings.
    pub fn with_components(n_components: usize) -> Self {
        Self {
            n_components,
            ..Self::default()
        }
    }

    /// Fit PCA to the rows of `x`.
    ///
    /// Components are the leading eigenvectors of the sample covariance,
    /// each flipped so its largest-magnitude loading is positive.
    ///
    /// # Errors
    /// Returns [`ReduceError::InvalidParameter`] unless
    /// `1 <= n_components <= min(rows, columns)`.
    pub fn fit(&self, x: &Array2<f64>) -> Result<FittedPca> {
        let (n, p) = x.dim();
        let k = self.n_components;
        if k == 0 || k > n.min(p) {
            return Err(ReduceError::InvalidParameter(format!(
                "n_components={k} must be between 1 and min(rows={n}, columns={p})"
            )));
        }

        let (mean, cov) = covariance(x)?;
        let total_variance = cov.diag().sum();
        let decomp = jacobi_eigendecomp(&cov, self.max_sweeps, self.tolerance)?;

        let mut components = Array2::<f64>::zeros((k, p));
        for (i, mut row) in components.axis_iter_mut(Axis(0)).enumerate() {
            let vector = decomp.eigenvectors.column(i);
            let pivot = vector
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            row.assign(&vector.mapv(|v| v * sign));
        }

        let explained_variance: Array1<f64> = decomp
            .eigenvalues
            .iter()
            .take(k)
            .map(|v| v.max(0.0))
            .collect();
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Array1::zeros(k)
        };

        tracing::info!(
            components = k,
            features = p,
            explained = explained_variance_ratio.sum(),
            "fitted PCA"
        );

        Ok(FittedPca {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }
}

/// Fitted PCA projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPca {
    mean: Array1<f64>,
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
}

impl FittedPca {
    /// Number of input features.
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Components as rows (`n_components x n_features`).
    pub const fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Variance captured by each component.
    pub const fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Share of total variance captured by each component.
    pub const fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }

    /// Running sum of [`Self::explained_variance_ratio`].
    pub fn cumulative_variance_ratio(&self) -> Vec<f64> {
        self.explained_variance_ratio
            .iter()
            .scan(0.0, |acc, r| {
                *acc += r;
                Some(*acc)
            })
            .collect()
    }

    /// Project rows of `x` onto the components.
    ///
    /// # Errors
    /// Returns [`ReduceError::DimensionMismatch`] when `x` does not have
    /// [`Self::n_features`] columns.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ReduceError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok((x - &self.mean).dot(&self.components.t()))
    }
}
