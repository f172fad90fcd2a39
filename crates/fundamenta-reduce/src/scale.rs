//! Column scalers with serializable fitted parameters.

use crate::error::{ReduceError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Maximum number of reference quantiles for [`ScalerKind::QuantileNormal`].
pub const MAX_QUANTILES: usize = 1000;

/// Distance from 0 and 1 used to keep normal quantiles finite.
const BOUNDS_THRESHOLD: f64 = 1e-7;

/// Scaling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    /// Center on the median and divide by the inter-quartile range
    Robust,
    /// Center on the mean and divide by the population standard deviation
    Standard,
    /// Map each column through its empirical CDF onto a standard normal
    #[default]
    QuantileNormal,
}

/// Fitted scaler parameters, one entry per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    /// Robust scaling
    Robust {
        /// Column medians
        center: Vec<f64>,
        /// Column inter-quartile ranges (zero replaced by one)
        scale: Vec<f64>,
    },
    /// Standard scaling
    Standard {
        /// Column means
        mean: Vec<f64>,
        /// Column standard deviations (zero replaced by one)
        scale: Vec<f64>,
    },
    /// Normal-output quantile transform
    QuantileNormal {
        /// Reference probabilities, evenly spaced on `[0, 1]`
        references: Vec<f64>,
        /// Per-column empirical quantiles at `references`
        quantiles: Vec<Vec<f64>>,
    },
}

impl ScalerKind {
    /// Fit the scaler to the columns of `x`.
    ///
    /// # Errors
    /// Returns [`ReduceError::InsufficientData`] when `x` has no rows.
    pub fn fit(self, x: &Array2<f64>) -> Result<FittedScaler> {
        if x.nrows() == 0 {
            return Err(ReduceError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        let columns = x.axis_iter(Axis(1)).map(sorted);

        Ok(match self {
            Self::Robust => {
                let (center, scale) = columns
                    .map(|v| {
                        let iqr = percentile(&v, 0.75) - percentile(&v, 0.25);
                        (percentile(&v, 0.5), non_zero(iqr))
                    })
                    .unzip();
                FittedScaler::Robust { center, scale }
            }
            Self::Standard => {
                let (mean, scale) = x
                    .axis_iter(Axis(1))
                    .map(|c| {
                        let mean = c.mean().unwrap_or(0.0);
                        (mean, non_zero(c.std(0.0)))
                    })
                    .unzip();
                FittedScaler::Standard { mean, scale }
            }
            Self::QuantileNormal => {
                let n_quantiles = x.nrows().min(MAX_QUANTILES).max(1);
                let references: Vec<f64> = if n_quantiles == 1 {
                    vec![0.0]
                } else {
                    (0..n_quantiles)
                        .map(|i| i as f64 / (n_quantiles - 1) as f64)
                        .collect()
                };
                let quantiles = columns
                    .map(|v| references.iter().map(|&p| percentile(&v, p)).collect())
                    .collect();
                FittedScaler::QuantileNormal {
                    references,
                    quantiles,
                }
            }
        })
    }
}

impl FittedScaler {
    /// Number of columns the scaler was fitted on.
    pub fn n_features(&self) -> usize {
        match self {
            Self::Robust { center, .. } => center.len(),
            Self::Standard { mean, .. } => mean.len(),
            Self::QuantileNormal { quantiles, .. } => quantiles.len(),
        }
    }

    /// Scale the columns of `x`.
    ///
    /// # Errors
    /// Returns [`ReduceError::DimensionMismatch`] when the column count
    /// differs from the fitted one.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ReduceError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let mut out = x.clone();
        match self {
            Self::Robust { center, scale } => {
                for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
                    column.mapv_inplace(|v| (v - center[j]) / scale[j]);
                }
            }
            Self::Standard { mean, scale } => {
                for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
                    column.mapv_inplace(|v| (v - mean[j]) / scale[j]);
                }
            }
            Self::QuantileNormal {
                references,
                quantiles,
            } => {
                let normal = standard_normal()?;
                let clip_max = normal.inverse_cdf(1.0 - BOUNDS_THRESHOLD);
                let clip_min = normal.inverse_cdf(BOUNDS_THRESHOLD);
                for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
                    let q = &quantiles[j];
                    column.mapv_inplace(|v| {
                        let p = quantile_position(v, q, references);
                        if p.is_nan() {
                            p
                        } else {
                            normal.inverse_cdf(p).clamp(clip_min, clip_max)
                        }
                    });
                }
            }
        }
        Ok(out)
    }
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| ReduceError::InvalidParameter(e.to_string()))
}

fn sorted(column: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut values = column.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

const fn non_zero(scale: f64) -> f64 {
    if scale == 0.0 { 1.0 } else { scale }
}

/// Linear-interpolated percentile of sorted values, `p` in `[0, 1]`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = p * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Piecewise-linear interpolation clamped to the end points.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }
    let i = xp.partition_point(|&v| v <= x) - 1;
    let span = xp[i + 1] - xp[i];
    if span == 0.0 {
        return fp[i];
    }
    fp[i] + (fp[i + 1] - fp[i]) * (x - xp[i]) / span
}

/// Empirical CDF position of `v`, averaging forward and backward
/// interpolation so runs of equal quantiles map to their midpoint.
fn quantile_position(v: f64, quantiles: &[f64], references: &[f64]) -> f64 {
    if v.is_nan() {
        return f64::NAN;
    }
    let last = quantiles.len() - 1;
    if v - BOUNDS_THRESHOLD < quantiles[0] {
        return 0.0;
    }
    if v + BOUNDS_THRESHOLD > quantiles[last] {
        return 1.0;
    }
    let reversed_x: Vec<f64> = quantiles.iter().rev().map(|q| -q).collect();
    let reversed_p: Vec<f64> = references.iter().rev().map(|r| -r).collect();
    0.5 * (interp(v, quantiles, references) - interp(-v, &reversed_x, &reversed_p))
}
