//! Summary statistics shared by the balance, outcome and reporting stages
//!
//! All helpers operate on plain `f64` slices. Empty input yields `NaN`
//! rather than panicking; callers guard where a count matters.

/// Arithmetic mean. `NaN` for empty input.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (n - 1 denominator). Zero for fewer than two values.
#[must_use]
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq = values.iter().fold(0.0_f64, |acc, v| {
        let d = v - m;
        d.mul_add(d, acc)
    });
    sum_sq / (values.len() - 1) as f64
}

/// Sample standard deviation (n - 1 denominator).
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Linearly interpolated percentile, `p` in [0, 1]. `NaN` for empty input.
///
/// Uses the (n - 1) * p positional definition, interpolating between the
/// bracketing order statistics. Sorts a copy; the input is untouched.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));

    let top = (sorted.len() - 1) as f64;
    let h = (top * p).clamp(0.0, top);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Nearest-rank percentile: the ceil(p * n)-th order statistic.
///
/// Always returns an observed value, so clamping a column to these bounds
/// and recomputing them reproduces the same bounds. Used for outcome
/// trimming, where repeated application must not tighten the clip.
#[must_use]
pub fn percentile_nearest(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));

    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Median via the interpolated percentile at 0.5.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 0.5)
}

/// Standardized mean difference between two groups.
///
/// `|mean_a - mean_b| / sqrt((var_a + var_b) / 2)`; zero when both
/// variances are zero.
#[must_use]
pub fn standardized_mean_difference(mean_a: f64, var_a: f64, mean_b: f64, var_b: f64) -> f64 {
    let pooled = ((var_a + var_b) / 2.0).sqrt();
    if pooled == 0.0 {
        return 0.0;
    }
    (mean_a - mean_b).abs() / pooled
}

/// Log-odds of a probability.
#[must_use]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Clamp a probability away from exactly 0 and 1 so its logit stays finite.
#[must_use]
pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(1e-12, 1.0 - 1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let values = [100.0, 200.0, 300.0];
        assert!((mean(&values) - 200.0).abs() < 1e-12);
        assert!((sample_variance(&values) - 10000.0).abs() < 1e-9);
        assert!((sample_std(&values) - 100.0).abs() < 1e-9);

        // Constant group has zero variance
        assert_eq!(sample_variance(&[150.0, 150.0, 150.0]), 0.0);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&values, 0.5) - 2.5).abs() < 1e-12);
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 1.0) - 4.0).abs() < 1e-12);
        assert!((median(&[100.0, 200.0, 300.0]) - 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_nearest_returns_observed_value() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile_nearest(&values, 0.05), 5.0);
        assert_eq!(percentile_nearest(&values, 0.95), 95.0);

        // Clamping to the bounds and recomputing reproduces them
        let lo = percentile_nearest(&values, 0.05);
        let hi = percentile_nearest(&values, 0.95);
        let clipped: Vec<f64> = values.iter().map(|v| v.clamp(lo, hi)).collect();
        assert_eq!(percentile_nearest(&clipped, 0.05), lo);
        assert_eq!(percentile_nearest(&clipped, 0.95), hi);
    }

    #[test]
    fn test_standardized_mean_difference_reference() {
        // Arms [100, 200, 300] vs [150, 150, 150]: 50 / sqrt(10000 / 2)
        let smd = standardized_mean_difference(200.0, 10000.0, 150.0, 0.0);
        assert!((smd - 0.7071).abs() < 0.001);

        // Identical arms give zero
        assert_eq!(standardized_mean_difference(5.0, 2.0, 5.0, 2.0), 0.0);
        // Both variances zero gives zero even when means differ
        assert_eq!(standardized_mean_difference(1.0, 0.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn test_logit_round_trip() {
        let p = 0.25;
        let l = logit(p);
        let back = 1.0 / (1.0 + (-l).exp());
        assert!((back - p).abs() < 1e-12);
        assert!(logit(clamp_probability(1.0)).is_finite());
        assert!(logit(clamp_probability(0.0)).is_finite());
    }
}
