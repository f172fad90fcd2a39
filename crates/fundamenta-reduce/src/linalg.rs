//! Linear algebra helpers
//!
//! Sample covariance and a cyclic Jacobi eigen solver for the symmetric
//! matrices produced by PCA.

use crate::error::{ReduceError, Result};
use ndarray::{Array1, Array2, Axis};

/// Result of eigenvalue decomposition
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues (sorted in descending order)
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors (columns are eigenvectors)
    pub eigenvectors: Array2<f64>,
}

/// Sample covariance of the columns of `x` (denominator `n - 1`).
///
/// # Errors
/// Returns [`ReduceError::InsufficientData`] for fewer than two rows.
pub fn covariance(x: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = x.nrows();
    if n < 2 {
        return Err(ReduceError::InsufficientData {
            required: 2,
            actual: n,
        });
    }
    let mean = x
        .mean_axis(Axis(0))
        .ok_or(ReduceError::InsufficientData { required: 2, actual: n })?;
    let centered = x - &mean;
    let cov = centered.t().dot(&centered) / (n as f64 - 1.0);
    Ok((mean, cov))
}

/// Cyclic Jacobi eigenvalue decomposition for symmetric matrices
///
/// Every sweep rotates each off-diagonal pair `(p, q)` once, in row-major
/// order. Iteration stops when the off-diagonal Frobenius norm falls below
/// `tolerance` times the norm of the whole matrix, or after `max_sweeps`.
///
/// # Arguments
/// * `matrix` - Symmetric matrix to decompose
/// * `max_sweeps` - Maximum number of full sweeps
/// * `tolerance` - Relative convergence tolerance
///
/// # Returns
/// * Eigenvalues and eigenvectors
pub fn jacobi_eigendecomp(
    matrix: &Array2<f64>,
    max_sweeps: usize,
    tolerance: f64,
) -> Result<EigenDecomposition> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(ReduceError::DimensionMismatch {
            expected: n,
            actual: matrix.ncols(),
        });
    }

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);
    let scale = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let threshold = tolerance * scale.max(f64::MIN_POSITIVE);

    let mut sweeps = 0;
    while sweeps < max_sweeps && off_diagonal_norm(&a) > threshold {
        for p in 0..n {
            for q in (p + 1)..n {
                if a[[p, q]] == 0.0 {
                    continue;
                }
                let (cos_theta, sin_theta) = compute_rotation(a[[p, p]], a[[q, q]], a[[p, q]]);
                apply_jacobi_rotation(&mut a, &mut v, p, q, cos_theta, sin_theta);
            }
        }
        sweeps += 1;
    }
    if sweeps == max_sweeps {
        tracing::warn!(sweeps, "Jacobi solver reached the sweep limit");
    }

    let eigenvalues: Array1<f64> = a.diag().to_owned();

    // Sort eigenvalues and eigenvectors in descending order
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&i, &j| eigenvalues[j].total_cmp(&eigenvalues[i]));

    let sorted_eigenvalues = indices.iter().map(|&i| eigenvalues[i]).collect();
    let mut sorted_eigenvectors = Array2::<f64>::zeros((n, n));
    for (new_idx, &old_idx) in indices.iter().enumerate() {
        sorted_eigenvectors
            .column_mut(new_idx)
            .assign(&v.column(old_idx));
    }

    Ok(EigenDecomposition {
        eigenvalues: sorted_eigenvalues,
        eigenvectors: sorted_eigenvectors,
    })
}

fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
    let mut sum = 0.0;
    for ((i, j), value) in a.indexed_iter() {
        if i != j {
            sum += value * value;
        }
    }
    sum.sqrt()
}

/// Rotation (cos, sin) that annihilates `apq`
fn compute_rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    if apq.abs() < 1e-300 {
        return (1.0, 0.0);
    }

    let tau = (aqq - app) / (2.0 * apq);
    let t = if tau >= 0.0 {
        1.0 / (tau + (1.0 + tau * tau).sqrt())
    } else {
        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
    };

    let cos_theta = 1.0 / (1.0 + t * t).sqrt();
    (cos_theta, t * cos_theta)
}

/// Apply a Jacobi rotation to matrix A and eigenvector matrix V
fn apply_jacobi_rotation(
    a: &mut Array2<f64>,
    v: &mut Array2<f64>,
    p: usize,
    q: usize,
    cos_theta: f64,
    sin_theta: f64,
) {
    let n = a.nrows();
    let (c, s) = (cos_theta, sin_theta);

    let app = a[[p, p]];
    let aqq = a[[q, q]];
    let apq = a[[p, q]];

    a[[p, p]] = c * c * app - 2.0 * c * s * apq + s * s * aqq;
    a[[q, q]] = s * s * app + 2.0 * c * s * apq + c * c * aqq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for i in 0..n {
        if i != p && i != q {
            let aip = a[[i, p]];
            let aiq = a[[i, q]];

            a[[i, p]] = c * aip - s * aiq;
            a[[p, i]] = a[[i, p]];

            a[[i, q]] = s * aip + c * aiq;
            a[[q, i]] = a[[i, q]];
        }
    }

    for i in 0..n {
        let vip = v[[i, p]];
        let viq = v[[i, q]];

        v[[i, p]] = c * vip - s * viq;
        v[[i, q]] = s * vip + c * viq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_diagonal_matrix() {
        let m = array![[1.0, 0.0], [0.0, 3.0]];
        let decomp = jacobi_eigendecomp(&m, 50, 1e-12).unwrap();
        assert_relative_eq!(decomp.eigenvalues[0], 3.0);
        assert_relative_eq!(decomp.eigenvalues[1], 1.0);
    }

    #[test]
    fn test_reconstruction() {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let decomp = jacobi_eigendecomp(&m, 50, 1e-14).unwrap();
        let lambda = Array2::from_diag(&decomp.eigenvalues);
        let rebuilt = decomp
            .eigenvectors
            .dot(&lambda)
            .dot(&decomp.eigenvectors.t());
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
        let trace: f64 = decomp.eigenvalues.sum();
        assert_relative_eq!(trace, 9.0, epsilon = 1e-10);
    }

    #[test]
    fn test_eigenvectors_orthonormal() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let decomp = jacobi_eigendecomp(&m, 50, 1e-14).unwrap();
        let gram = decomp.eigenvectors.t().dot(&decomp.eigenvectors);
        assert_relative_eq!(gram[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(gram[[0, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(decomp.eigenvalues[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_square_rejected() {
        let m = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            jacobi_eigendecomp(&m, 10, 1e-12),
            Err(ReduceError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_covariance_uses_sample_denominator() {
        let x = array![[1.0, 2.0], [3.0, 6.0]];
        let (mean, cov) = covariance(&x).unwrap();
        assert_relative_eq!(mean[0], 2.0);
        assert_relative_eq!(cov[[0, 0]], 2.0);
        assert_relative_eq!(cov[[0, 1]], 4.0);
        assert_relative_eq!(cov[[1, 1]], 8.0);
    }
}
