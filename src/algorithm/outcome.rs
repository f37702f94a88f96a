//! Outcome comparison on the matched cohort
//!
//! Compares claim costs between the matched arms: per-arm summaries,
//! Welch's t-test, a Mann-Whitney U test with tie correction, and the
//! net savings implied by the matched pairs.

use log::{info, warn};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::algorithm::matching::MatchOutcome;
use crate::cohort::Cohort;
use crate::error::{CohortError, Result};
use crate::utils::stats::{mean, percentile, sample_std, sample_variance, standardized_mean_difference};

/// Distribution summary for one arm on one outcome column.
#[derive(Debug, Clone)]
pub struct ArmSummary {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl ArmSummary {
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                n: 0,
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                q1: 0.0,
                median: 0.0,
                q3: 0.0,
                max: 0.0,
            };
        }
        Self {
            n: values.len(),
            mean: mean(values),
            std_dev: sample_std(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            q1: percentile(values, 0.25),
            median: percentile(values, 0.5),
            q3: percentile(values, 0.75),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Welch's unequal-variance t-test, two sided.
#[derive(Debug, Clone, Copy)]
pub struct WelchResult {
    pub statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
}

/// Mann-Whitney U test under the normal approximation, two sided.
#[derive(Debug, Clone, Copy)]
pub struct MannWhitneyResult {
    /// U statistic of the first sample
    pub statistic: f64,
    pub p_value: f64,
}

/// Test results for one outcome column across the matched arms.
#[derive(Debug, Clone)]
pub struct OutcomeTest {
    pub label: String,
    pub treated: ArmSummary,
    pub control: ArmSummary,
    /// Treated mean minus control mean
    pub mean_difference: f64,
    pub smd: f64,
    pub welch: Option<WelchResult>,
    pub mann_whitney: Option<MannWhitneyResult>,
}

/// Net savings over the matched pairs: control cost minus treated cost,
/// so a positive number means the treated plan was cheaper.
#[derive(Debug, Clone)]
pub struct NetSavings {
    pub per_member: f64,
    pub total: f64,
    pub pairs: usize,
    /// Which outcome column the savings are computed on
    pub basis: String,
}

/// Full outcome comparison for a matched cohort.
#[derive(Debug, Clone)]
pub struct OutcomeReport {
    pub tests: Vec<OutcomeTest>,
    pub savings: NetSavings,
}

/// Compare every outcome column between the matched arms.
///
/// # Arguments
///
/// * `cohort` - The cohort the matching ran on
/// * `outcome` - The matching result aligned with that cohort
///
/// # Returns
///
/// An `OutcomeReport` with one test per outcome column plus the net
/// savings over the pairs. Savings are computed on the per-period sum
/// when period columns exist, otherwise on the total column.
///
/// # Errors
///
/// Fails when no pairs were matched or the result is misaligned with
/// the cohort.
pub fn compare_outcomes(cohort: &Cohort, outcome: &MatchOutcome) -> Result<OutcomeReport> {
    if outcome.is_matched.len() != cohort.len() {
        return Err(CohortError::Validation(format!(
            "matching result covers {} rows but the cohort has {}",
            outcome.is_matched.len(),
            cohort.len()
        )));
    }
    if outcome.pairs.is_empty() {
        return Err(CohortError::InsufficientData(
            "no matched pairs to compare outcomes on".to_string(),
        ));
    }

    let treated_rows = outcome.matched_treated();
    let control_rows = outcome.matched_control();

    let mut tests = Vec::new();
    for (label, values) in cohort.outcome_columns() {
        let treated: Vec<f64> = treated_rows.iter().map(|&row| values[row]).collect();
        let control: Vec<f64> = control_rows.iter().map(|&row| values[row]).collect();
        tests.push(build_test(label, &treated, &control)?);
    }

    let (basis, values) = match cohort.period_sums() {
        Some(sums) => ("sum of period outcomes".to_string(), sums),
        None => match &cohort.total_outcome {
            Some((name, v)) => (name.clone(), v.clone()),
            None => {
                return Err(CohortError::Validation(
                    "no outcome column is available for the savings computation".to_string(),
                ));
            }
        },
    };
    let total: f64 = outcome
        .pairs
        .iter()
        .map(|pair| values[pair.control_idx] - values[pair.treated_idx])
        .sum();
    let pairs = outcome.pairs.len();
    let savings = NetSavings {
        per_member: total / pairs as f64,
        total,
        pairs,
        basis,
    };

    info!(
        "Compared {} outcome columns across {pairs} matched pairs; net savings {:.2} per member on {}",
        tests.len(),
        savings.per_member,
        savings.basis
    );

    Ok(OutcomeReport { tests, savings })
}

fn build_test(label: &str, treated: &[f64], control: &[f64]) -> Result<OutcomeTest> {
    let treated_summary = ArmSummary::from_values(treated);
    let control_summary = ArmSummary::from_values(control);
    let mean_difference = treated_summary.mean - control_summary.mean;
    let smd = standardized_mean_difference(
        treated_summary.mean,
        sample_variance(treated),
        control_summary.mean,
        sample_variance(control),
    );

    let welch = if treated.len() < 2 || control.len() < 2 {
        warn!("Skipping Welch's t-test for {label}: need at least two members per arm");
        None
    } else {
        Some(welch_t_test(treated, control)?)
    };
    let mann_whitney = Some(mann_whitney_u(treated, control)?);

    Ok(OutcomeTest {
        label: label.to_string(),
        treated: treated_summary,
        control: control_summary,
        mean_difference,
        smd,
        welch,
        mann_whitney,
    })
}

/// Welch's two-sample t-test with Satterthwaite degrees of freedom.
///
/// When both samples are constant the test degenerates: equal means give
/// t = 0 and p = 1, unequal means give an infinite statistic and p = 0.
///
/// # Errors
///
/// Fails when either sample has fewer than two values.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<WelchResult> {
    if a.len() < 2 || b.len() < 2 {
        return Err(CohortError::InsufficientData(
            "Welch's t-test needs at least two values per sample".to_string(),
        ));
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (sample_variance(a), sample_variance(b));

    if va == 0.0 && vb == 0.0 {
        warn!("Both samples are constant; reporting a degenerate t-test");
        let degrees_of_freedom = na + nb - 2.0;
        return Ok(if (ma - mb).abs() <= f64::EPSILON * ma.abs().max(mb.abs()).max(1.0) {
            WelchResult {
                statistic: 0.0,
                degrees_of_freedom,
                p_value: 1.0,
            }
        } else {
            WelchResult {
                statistic: if ma > mb {
                    f64::INFINITY
                } else {
                    f64::NEG_INFINITY
                },
                degrees_of_freedom,
                p_value: 0.0,
            }
        });
    }

    let se2 = va / na + vb / nb;
    let statistic = (ma - mb) / se2.sqrt();
    let degrees_of_freedom =
        se2 * se2 / ((va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0));

    let distribution = StudentsT::new(0.0, 1.0, degrees_of_freedom)
        .map_err(|e| CohortError::Estimation(format!("invalid t distribution: {e}")))?;
    let p_value = 2.0 * distribution.cdf(-statistic.abs());

    Ok(WelchResult {
        statistic,
        degrees_of_freedom,
        p_value,
    })
}

/// Mann-Whitney U test with average ranks, tie-corrected variance, and
/// a continuity correction on the normal approximation.
///
/// # Errors
///
/// Fails when either sample is empty.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Result<MannWhitneyResult> {
    if a.is_empty() || b.is_empty() {
        return Err(CohortError::InsufficientData(
            "Mann-Whitney U needs at least one value per sample".to_string(),
        ));
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let n = a.len() + b.len();

    let mut pooled: Vec<(f64, bool)> = a
        .iter()
        .map(|&v| (v, true))
        .chain(b.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

    // Average ranks within tie groups, collecting the tie correction
    let mut ranks = vec![0.0; n];
    let mut tie_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0 + 1.0;
        for rank in &mut ranks[i..=j] {
            *rank = average;
        }
        let count = (j - i + 1) as f64;
        if count > 1.0 {
            tie_sum += count * count * count - count;
        }
        i = j + 1;
    }

    let r1: f64 = ranks
        .iter()
        .zip(&pooled)
        .filter(|&(_, &(_, first))| first)
        .map(|(rank, _)| rank)
        .sum();
    let statistic = r1 - na * (na + 1.0) / 2.0;

    let total = n as f64;
    let mu = na * nb / 2.0;
    let tie_term = if n > 1 {
        tie_sum / (total * (total - 1.0))
    } else {
        0.0
    };
    let sigma2 = na * nb / 12.0 * ((total + 1.0) - tie_term);
    if sigma2 <= 0.0 {
        warn!("All pooled values are tied; reporting p = 1 for the U test");
        return Ok(MannWhitneyResult {
            statistic,
            p_value: 1.0,
        });
    }

    let z = ((statistic - mu).abs() - 0.5).max(0.0) / sigma2.sqrt();
    let normal = Normal::new(0.0, 1.0).unwrap();
    let p_value = 2.0 * (1.0 - normal.cdf(z));

    Ok(MannWhitneyResult { statistic, p_value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::matching::MatchedPair;
    use ndarray::Array2;

    #[test]
    fn test_welch_reference_values() {
        let a = [100.0, 200.0, 300.0];
        let b = [150.0, 150.0, 150.0];
        let result = welch_t_test(&a, &b).unwrap();

        assert!((result.statistic - 0.8660).abs() < 0.001);
        assert!((result.degrees_of_freedom - 2.0).abs() < 1e-9);
        assert!((result.p_value - 0.4778).abs() < 0.001);
    }

    #[test]
    fn test_welch_degenerate_constant_samples() {
        let equal = welch_t_test(&[5.0, 5.0, 5.0], &[5.0, 5.0]).unwrap();
        assert_eq!(equal.statistic, 0.0);
        assert_eq!(equal.p_value, 1.0);
        assert_eq!(equal.degrees_of_freedom, 3.0);

        let apart = welch_t_test(&[7.0, 7.0], &[5.0, 5.0, 5.0]).unwrap();
        assert!(apart.statistic.is_infinite() && apart.statistic > 0.0);
        assert_eq!(apart.p_value, 0.0);
    }

    #[test]
    fn test_mann_whitney_reference_values() {
        let a = [100.0, 200.0, 300.0];
        let b = [150.0, 150.0, 150.0];
        let result = mann_whitney_u(&a, &b).unwrap();

        assert!((result.statistic - 6.0).abs() < 1e-9);
        assert!((result.p_value - 0.6427).abs() < 0.001);
    }

    #[test]
    fn test_mann_whitney_without_ties() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        let result = mann_whitney_u(&a, &b).unwrap();

        assert!((result.statistic - 0.0).abs() < 1e-9);
        assert!((result.p_value - 0.2453).abs() < 0.001);
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        let result = mann_whitney_u(&[2.0, 2.0], &[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_arm_summary_quartiles() {
        let summary = ArmSummary::from_values(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(summary.n, 5);
        assert_eq!(summary.mean, 30.0);
        assert_eq!(summary.median, 30.0);
        assert_eq!(summary.q1, 20.0);
        assert_eq!(summary.q3, 40.0);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 50.0);
    }

    fn four_member_cohort(totals: Vec<f64>) -> Cohort {
        Cohort {
            member_ids: (0..4).map(|i| format!("M{i:03}")).collect(),
            treated: vec![true, false, true, false],
            age: vec![60.0; 4],
            gender_code: vec![0.0; 4],
            gender_label: vec!["F".to_string(); 4],
            zip_bucket: vec!["303".to_string(); 4],
            severity: vec![4.0; 4],
            covariate_names: vec!["age".to_string()],
            covariates: Array2::zeros((4, 1)),
            total_outcome: Some(("total_claim".to_string(), totals)),
            period_outcomes: Vec::new(),
        }
    }

    fn two_pair_outcome() -> MatchOutcome {
        MatchOutcome {
            pairs: vec![
                MatchedPair {
                    treated_idx: 0,
                    control_idx: 1,
                    distance: 0.0,
                },
                MatchedPair {
                    treated_idx: 2,
                    control_idx: 3,
                    distance: 0.0,
                },
            ],
            is_matched: vec![true; 4],
            unmatched_treated: 0,
            unmatched_control: 0,
        }
    }

    #[test]
    fn test_compare_outcomes_savings_direction() {
        // Treated costs 100/200, controls cost 150/250: treated is
        // cheaper by 50 per pair
        let cohort = four_member_cohort(vec![100.0, 150.0, 200.0, 250.0]);
        let report = compare_outcomes(&cohort, &two_pair_outcome()).unwrap();

        assert_eq!(report.tests.len(), 1);
        let test = &report.tests[0];
        assert_eq!(test.label, "total_claim");
        assert!((test.mean_difference - (-50.0)).abs() < 1e-9);

        assert_eq!(report.savings.pairs, 2);
        assert!((report.savings.per_member - 50.0).abs() < 1e-9);
        assert!((report.savings.total - 100.0).abs() < 1e-9);
        assert_eq!(report.savings.basis, "total_claim");
    }

    #[test]
    fn test_compare_outcomes_prefers_period_sums_for_savings() {
        let mut cohort = four_member_cohort(vec![100.0, 150.0, 200.0, 250.0]);
        cohort.period_outcomes = vec![
            ("claim_y1".to_string(), vec![10.0, 20.0, 30.0, 40.0]),
            ("claim_y2".to_string(), vec![1.0, 2.0, 3.0, 4.0]),
        ];
        let report = compare_outcomes(&cohort, &two_pair_outcome()).unwrap();

        // total, then the two periods
        assert_eq!(report.tests.len(), 3);
        assert_eq!(report.savings.basis, "sum of period outcomes");
        // Pair sums: (22 - 11) + (44 - 33) = 22
        assert!((report.savings.total - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_outcomes_rejects_empty_matching() {
        let cohort = four_member_cohort(vec![100.0, 150.0, 200.0, 250.0]);
        let outcome = MatchOutcome {
            pairs: Vec::new(),
            is_matched: vec![false; 4],
            unmatched_treated: 2,
            unmatched_control: 2,
        };
        let result = compare_outcomes(&cohort, &outcome);
        assert!(matches!(result, Err(CohortError::InsufficientData(_))));
    }
}
