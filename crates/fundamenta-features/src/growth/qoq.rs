//! Guarded quarter-over-quarter change.

use crate::quarter::QuarterLabel;

/// Denominator substituted for a zero previous value.
pub const QOQ_EPSILON: f64 = 1e-8;

/// Symmetric bound applied to every QoQ change.
pub const QOQ_CLIP: f64 = 1000.0;

/// Relative change from `prev` to `cur` using the default guards.
///
/// - a zero `prev` is replaced by [`QOQ_EPSILON`] in the denominator
/// - `prev == 0 && cur == 0` is exactly `0.0`
/// - the result is clamped to `[-QOQ_CLIP, QOQ_CLIP]`
///
/// NaN inputs propagate.
pub fn qoq_change(prev: f64, cur: f64) -> f64 {
    qoq_change_with(prev, cur, QOQ_EPSILON, QOQ_CLIP)
}

/// [`qoq_change`] with explicit guard parameters.
pub fn qoq_change_with(prev: f64, cur: f64, epsilon: f64, clip: f64) -> f64 {
    if prev == 0.0 && cur == 0.0 {
        return 0.0;
    }
    let den = if prev == 0.0 { epsilon } else { prev };
    let change = (cur - prev) / den;
    if change.is_nan() {
        change
    } else {
        change.clamp(-clip, clip)
    }
}

/// Name of the QoQ column of `metric` between two quarters,
/// e.g. `Revenue_QoQ_24Q2_24Q3`.
pub fn qoq_column(metric: &str, prev: QuarterLabel, cur: QuarterLabel) -> String {
    format!("{metric}_QoQ_{}_{}", prev.short(), cur.short())
}
