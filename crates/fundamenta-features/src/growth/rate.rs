//! OLS trend slopes over short, noisy series.

/// Denominators below this are treated as zero.
const DENOMINATOR_TOLERANCE: f64 = 1e-12;

/// Least-squares slope of `values` against `t = 0..n-1`.
///
/// Non-finite entries are discarded (order of the rest is kept, so the
/// remaining points are re-indexed). Fewer than two points give NaN, and a
/// numerically zero denominator gives `0.0`.
pub fn safe_slope(values: &[f64]) -> f64 {
    let clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = clean.len();
    if n < 2 {
        return f64::NAN;
    }

    let n_f = n as f64;
    let (sum_t, sum_y, sum_ty, sum_tt) = clean.iter().enumerate().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(st, sy, sty, stt), (t, &y)| {
            let t = t as f64;
            (st + t, sy + y, sty + t * y, stt + t * t)
        },
    );

    let denominator = n_f * sum_tt - sum_t * sum_t;
    if denominator.abs() < DENOMINATOR_TOLERANCE {
        return 0.0;
    }
    (n_f * sum_ty - sum_t * sum_y) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_too_short_is_nan() {
        assert!(safe_slope(&[]).is_nan());
        assert!(safe_slope(&[5.0]).is_nan());
        assert!(safe_slope(&[f64::NAN, 5.0, f64::INFINITY]).is_nan());
    }

    #[test]
    fn test_linear_series() {
        assert_relative_eq!(safe_slope(&[1.0, 3.0, 5.0, 7.0]), 2.0, epsilon = 1e-12);
        assert_relative_eq!(safe_slope(&[4.0, 2.0]), -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_series_is_flat() {
        assert_relative_eq!(safe_slope(&[3.0, 3.0, 3.0]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_entries_are_reindexed() {
        // [1, NaN, 3, 5] keeps [1, 3, 5] at t = 0, 1, 2
        assert_relative_eq!(safe_slope(&[1.0, f64::NAN, 3.0, 5.0]), 2.0, epsilon = 1e-12);
    }
}
