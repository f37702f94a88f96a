//! Balance assessment for propensity-matched cohorts
//!
//! This module measures how well matching balanced the covariates between
//! the treated and control arms. Each covariate gets a standardized mean
//! difference both before matching (full prepared cohort) and after
//! (matched arms only), so the improvement attributable to matching is
//! visible in one table.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::info;
use ndarray::ArrayView1;

use crate::algorithm::matching::matcher::MatchOutcome;
use crate::cohort::Cohort;
use crate::error::{CohortError, Result};
use crate::utils::stats::{mean, sample_std, sample_variance, standardized_mean_difference};

/// Balance of one covariate between the matched arms.
#[derive(Debug, Clone)]
pub struct BalanceMetric {
    /// Name of the covariate column
    pub name: String,

    /// Standardized mean difference over the full prepared cohort
    pub smd_before: f64,

    /// Standardized mean difference over the matched arms
    pub smd_after: f64,

    /// Mean for matched treated members
    pub treated_mean: f64,

    /// Mean for matched controls
    pub control_mean: f64,

    /// Standard deviation for matched treated members
    pub treated_std: f64,

    /// Standard deviation for matched controls
    pub control_std: f64,
}

/// Summary statistics over the after-matching standardized differences.
#[derive(Debug, Clone)]
pub struct BalanceSummary {
    /// Number of covariates with |SMD| above the threshold after matching
    pub imbalanced_covariates: usize,

    /// Maximum |SMD| after matching
    pub max_standardized_difference: f64,

    /// Mean |SMD| after matching
    pub mean_absolute_standardized_difference: f64,

    /// Total number of covariates assessed
    pub total_covariates: usize,
}

/// Report on covariate balance before and after matching.
#[derive(Debug, Clone)]
pub struct BalanceReport {
    /// Balance metrics for each covariate
    pub metrics: Vec<BalanceMetric>,

    /// Summary statistics
    pub summary: BalanceSummary,

    /// Threshold the summary counts against
    pub threshold: f64,
}

impl BalanceReport {
    /// Metrics sorted by descending |SMD| after matching.
    #[must_use]
    pub fn sorted_metrics(&self) -> Vec<BalanceMetric> {
        let mut sorted = self.metrics.clone();
        sorted.sort_by(|a, b| b.smd_after.abs().total_cmp(&a.smd_after.abs()));
        sorted
    }

    /// Render the report as a fixed-width console table.
    ///
    /// The threshold is an advisory comparison point; nothing fails on it.
    #[must_use]
    pub fn to_table_string(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Balance Summary (after matching):\n\
             - Total covariates: {}\n\
             - Covariates with |SMD| > {}: {} ({:.1}%)\n\
             - Maximum |SMD|: {:.4}\n\
             - Mean |SMD|: {:.4}\n\n",
            self.summary.total_covariates,
            self.threshold,
            self.summary.imbalanced_covariates,
            if self.summary.total_covariates > 0 {
                100.0 * self.summary.imbalanced_covariates as f64
                    / self.summary.total_covariates as f64
            } else {
                0.0
            },
            self.summary.max_standardized_difference,
            self.summary.mean_absolute_standardized_difference
        ));

        output.push_str(
            "Covariate                      | Treated Mean | Control Mean | Treated SD | Control SD | SMD Before | SMD After\n\
             -------------------------------|--------------|--------------|------------|------------|------------|----------\n"
        );

        for metric in self.sorted_metrics() {
            let flag = if metric.smd_after.abs() > self.threshold {
                " *"
            } else {
                ""
            };
            output.push_str(&format!(
                "{:<30} | {:>12.4} | {:>12.4} | {:>10.4} | {:>10.4} | {:>10.4} | {:>9.4}{}\n",
                truncate_string(&metric.name, 30),
                metric.treated_mean,
                metric.control_mean,
                metric.treated_std,
                metric.control_std,
                metric.smd_before,
                metric.smd_after,
                flag
            ));
        }

        output
    }

    /// Write the report to a CSV file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn write_to_csv(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;

        writeln!(
            file,
            "Covariate,Treated Mean,Control Mean,Treated SD,Control SD,SMD Before,SMD After"
        )?;

        for metric in self.sorted_metrics() {
            writeln!(
                file,
                "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
                escape_csv(&metric.name),
                metric.treated_mean,
                metric.control_mean,
                metric.treated_std,
                metric.control_std,
                metric.smd_before,
                metric.smd_after
            )?;
        }

        writeln!(file)?;
        writeln!(file, "Summary Statistics,,,,,,")?;
        writeln!(file, "Total covariates,{},,,,,", self.summary.total_covariates)?;
        writeln!(
            file,
            "Imbalanced covariates (|SMD| > {}),{},,,,,",
            self.threshold, self.summary.imbalanced_covariates
        )?;
        writeln!(
            file,
            "Maximum |SMD| after matching,{:.6},,,,,",
            self.summary.max_standardized_difference
        )?;
        writeln!(
            file,
            "Mean |SMD| after matching,{:.6},,,,,",
            self.summary.mean_absolute_standardized_difference
        )?;

        Ok(())
    }
}

/// Checker computing balance metrics for a matched cohort
pub struct BalanceChecker {
    /// Threshold for counting a covariate as imbalanced
    imbalance_threshold: f64,
}

impl Default for BalanceChecker {
    fn default() -> Self {
        Self {
            imbalance_threshold: 0.1,
        }
    }
}

impl BalanceChecker {
    /// Create a new balance checker with the conventional 0.1 threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the threshold for counting a covariate as imbalanced.
    #[must_use]
    pub const fn with_imbalance_threshold(mut self, threshold: f64) -> Self {
        self.imbalance_threshold = threshold;
        self
    }

    /// Compute balance metrics for every covariate in the cohort.
    ///
    /// # Arguments
    ///
    /// * `cohort` - The prepared cohort the matching ran over
    /// * `outcome` - The matching result aligned with that cohort
    ///
    /// # Returns
    ///
    /// A `BalanceReport` with per-covariate metrics and summary statistics.
    ///
    /// # Errors
    ///
    /// Fails when the outcome is misaligned with the cohort or a matched
    /// arm is empty.
    pub fn check(&self, cohort: &Cohort, outcome: &MatchOutcome) -> Result<BalanceReport> {
        if outcome.is_matched.len() != cohort.len() {
            return Err(CohortError::Validation(format!(
                "match flags ({}) are misaligned with the cohort ({})",
                outcome.is_matched.len(),
                cohort.len()
            )));
        }

        let mut full_treated = Vec::new();
        let mut full_control = Vec::new();
        let mut matched_treated = Vec::new();
        let mut matched_control = Vec::new();
        for idx in 0..cohort.len() {
            if cohort.treated[idx] {
                full_treated.push(idx);
                if outcome.is_matched[idx] {
                    matched_treated.push(idx);
                }
            } else {
                full_control.push(idx);
                if outcome.is_matched[idx] {
                    matched_control.push(idx);
                }
            }
        }

        if matched_treated.is_empty() || matched_control.is_empty() {
            return Err(CohortError::InsufficientData(
                "balance assessment needs matched members in both arms".to_string(),
            ));
        }

        let mut metrics = Vec::with_capacity(cohort.covariate_names.len());
        for (col_idx, name) in cohort.covariate_names.iter().enumerate() {
            let column = cohort.covariates.column(col_idx);
            metrics.push(column_metric(
                name,
                &column,
                (&full_treated, &full_control),
                (&matched_treated, &matched_control),
            ));
        }

        let summary = self.summarize(&metrics);
        info!(
            "Balance assessment complete: {} of {} covariates above |SMD| {} after matching",
            summary.imbalanced_covariates, summary.total_covariates, self.imbalance_threshold
        );

        Ok(BalanceReport {
            metrics,
            summary,
            threshold: self.imbalance_threshold,
        })
    }

    fn summarize(&self, metrics: &[BalanceMetric]) -> BalanceSummary {
        let mut imbalanced = 0;
        let mut max_abs = 0.0;
        let mut sum_abs = 0.0;

        for metric in metrics {
            let abs = metric.smd_after.abs();
            if abs > self.imbalance_threshold {
                imbalanced += 1;
            }
            if abs > max_abs {
                max_abs = abs;
            }
            sum_abs += abs;
        }

        BalanceSummary {
            imbalanced_covariates: imbalanced,
            max_standardized_difference: max_abs,
            mean_absolute_standardized_difference: if metrics.is_empty() {
                0.0
            } else {
                sum_abs / metrics.len() as f64
            },
            total_covariates: metrics.len(),
        }
    }
}

fn column_metric(
    name: &str,
    column: &ArrayView1<'_, f64>,
    full: (&[usize], &[usize]),
    matched: (&[usize], &[usize]),
) -> BalanceMetric {
    let gather = |rows: &[usize]| -> Vec<f64> { rows.iter().map(|&i| column[i]).collect() };

    let before_treated = gather(full.0);
    let before_control = gather(full.1);
    let after_treated = gather(matched.0);
    let after_control = gather(matched.1);

    let treated_mean = mean(&after_treated);
    let control_mean = mean(&after_control);

    BalanceMetric {
        name: name.to_string(),
        smd_before: standardized_mean_difference(
            mean(&before_treated),
            sample_variance(&before_treated),
            mean(&before_control),
            sample_variance(&before_control),
        ),
        smd_after: standardized_mean_difference(
            treated_mean,
            sample_variance(&after_treated),
            control_mean,
            sample_variance(&after_control),
        ),
        treated_mean,
        control_mean,
        treated_std: sample_std(&after_treated),
        control_std: sample_std(&after_control),
    }
}

/// Truncate a string to a maximum length
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[0..max_len - 3])
    }
}

/// Escape a string for CSV output
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn single_covariate_cohort(treated: &[bool], values: &[f64]) -> Cohort {
        let n = treated.len();
        Cohort {
            member_ids: (0..n).map(|i| format!("M{i:03}")).collect(),
            treated: treated.to_vec(),
            age: values.to_vec(),
            gender_code: vec![0.0; n],
            gender_label: vec!["F".to_string(); n],
            zip_bucket: vec!["303".to_string(); n],
            severity: vec![0.0; n],
            covariate_names: vec!["age".to_string()],
            covariates: Array2::from_shape_vec((n, 1), values.to_vec()).unwrap(),
            total_outcome: None,
            period_outcomes: Vec::new(),
        }
    }

    fn all_matched(n: usize) -> MatchOutcome {
        MatchOutcome {
            pairs: Vec::new(),
            is_matched: vec![true; n],
            unmatched_treated: 0,
            unmatched_control: 0,
        }
    }

    #[test]
    fn test_identical_arms_give_zero_smd() {
        let treated = [true, true, true, false, false, false];
        let values = [10.0, 20.0, 30.0, 10.0, 20.0, 30.0];
        let cohort = single_covariate_cohort(&treated, &values);

        let report = BalanceChecker::new().check(&cohort, &all_matched(6)).unwrap();
        assert_eq!(report.metrics.len(), 1);
        assert!(report.metrics[0].smd_after.abs() < 1e-12);
        assert_eq!(report.summary.imbalanced_covariates, 0);
    }

    #[test]
    fn test_reference_smd_value() {
        // Treated [100, 200, 300] vs control [150, 150, 150]:
        // 50 / sqrt((10000 + 0) / 2) = 0.7071
        let treated = [true, true, true, false, false, false];
        let values = [100.0, 200.0, 300.0, 150.0, 150.0, 150.0];
        let cohort = single_covariate_cohort(&treated, &values);

        let report = BalanceChecker::new().check(&cohort, &all_matched(6)).unwrap();
        let metric = &report.metrics[0];
        assert!((metric.smd_after - 0.7071).abs() < 0.001);
        assert!((metric.treated_mean - 200.0).abs() < 1e-9);
        assert!((metric.control_mean - 150.0).abs() < 1e-9);
        assert!((metric.treated_std - 100.0).abs() < 1e-9);
        assert_eq!(report.summary.imbalanced_covariates, 1);
    }

    #[test]
    fn test_matching_improves_reported_balance() {
        // Unmatched treated extreme at row 3 inflates the before-SMD only
        let treated = [true, true, true, true, false, false, false];
        let values = [10.0, 20.0, 30.0, 500.0, 10.0, 20.0, 30.0];
        let cohort = single_covariate_cohort(&treated, &values);

        let outcome = MatchOutcome {
            pairs: Vec::new(),
            is_matched: vec![true, true, true, false, true, true, true],
            unmatched_treated: 1,
            unmatched_control: 0,
        };
        let report = BalanceChecker::new().check(&cohort, &outcome).unwrap();
        let metric = &report.metrics[0];

        assert!(metric.smd_before > 0.5);
        assert!(metric.smd_after.abs() < 1e-12);
    }

    #[test]
    fn test_misaligned_flags_are_rejected() {
        let cohort = single_covariate_cohort(&[true, false], &[1.0, 2.0]);
        let outcome = all_matched(3);
        assert!(BalanceChecker::new().check(&cohort, &outcome).is_err());
    }

    #[test]
    fn test_table_marks_imbalanced_covariates() {
        let treated = [true, true, true, false, false, false];
        let values = [100.0, 200.0, 300.0, 150.0, 150.0, 150.0];
        let cohort = single_covariate_cohort(&treated, &values);
        let report = BalanceChecker::new().check(&cohort, &all_matched(6)).unwrap();

        let table = report.to_table_string();
        assert!(table.contains("Balance Summary"));
        assert!(table.contains("age"));
        assert!(table.contains('*'));
    }
}
