//! Report generation
//!
//! The reporter is the last pipeline stage: it prints the stdout views
//! and writes the CSV and SVG artifacts the configuration enables. It
//! is purely presentational and feeds nothing back upstream.

pub mod charts;
pub mod tables;

use log::{info, warn};
use std::fs;
use std::path::PathBuf;

use crate::algorithm::matching::{BalanceReport, MatchOutcome};
use crate::algorithm::outcome::{ArmSummary, OutcomeReport};
use crate::cohort::Cohort;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::utils::stats::mean;

/// Writes the configured report views for one analysis run.
pub struct Reporter<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> Reporter<'a> {
    #[must_use]
    pub const fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Print the stdout tables and write every enabled artifact.
    ///
    /// Views whose inputs are missing (no per-period columns, unmatched
    /// members not retained) are skipped with a logged warning.
    ///
    /// # Errors
    ///
    /// Fails when the output directory or an artifact cannot be written.
    pub fn emit(
        &self,
        cohort: &Cohort,
        matching: &MatchOutcome,
        balance: &BalanceReport,
        outcomes: &OutcomeReport,
    ) -> Result<Vec<PathBuf>> {
        let config = self.config;
        let dir = &config.output_dir;
        fs::create_dir_all(dir)?;
        let mut artifacts = Vec::new();

        println!("{}", balance.to_table_string());
        println!(
            "{}",
            tables::outcome_table(outcomes, &config.treated_label, &config.control_label)
        );

        if config.views.top_claims {
            match tables::top_claims_tables(
                cohort,
                matching,
                config.top_claims,
                &config.treated_label,
                &config.control_label,
            ) {
                Some(table) => println!("{table}"),
                None => warn!("Top claims view skipped: no per-period outcome columns"),
            }
        }
        if config.views.outliers {
            if config.keep_unmatched {
                match tables::outlier_table(
                    cohort,
                    matching,
                    config.outlier_threshold,
                    &config.treated_label,
                    &config.control_label,
                ) {
                    Some(table) => println!("{table}"),
                    None => warn!("Outlier view skipped: no aggregate outcome column"),
                }
            } else {
                warn!("Outlier view skipped: unmatched members are not retained");
            }
        }

        // CSV artifacts are always written
        let balance_csv = dir.join("balance_report.csv");
        balance.write_to_csv(&balance_csv)?;
        artifacts.push(balance_csv);
        let outcome_csv = dir.join("outcome_summary.csv");
        fs::write(&outcome_csv, tables::outcome_csv(outcomes))?;
        artifacts.push(outcome_csv);

        if config.views.balance_plot {
            let path = dir.join("balance_smd.svg");
            fs::write(&path, charts::balance_chart(balance))?;
            artifacts.push(path);
        }

        let aggregate = cohort.aggregate_outcome();
        let treated_rows = matching.matched_treated();
        let control_rows = matching.matched_control();
        let gather =
            |values: &[f64], rows: &[usize]| -> Vec<f64> { rows.iter().map(|&r| values[r]).collect() };

        if config.views.box_plot {
            if let Some((label, values)) = &aggregate {
                let treated = ArmSummary::from_values(&gather(values, &treated_rows));
                let control = ArmSummary::from_values(&gather(values, &control_rows));
                let path = dir.join("outcome_box.svg");
                fs::write(
                    &path,
                    charts::box_plot_chart(
                        label,
                        &treated,
                        &control,
                        &config.treated_label,
                        &config.control_label,
                    ),
                )?;
                artifacts.push(path);
            } else {
                warn!("Box plot skipped: no aggregate outcome column");
            }
        }

        if config.views.ecdf_plot {
            if let Some((label, values)) = &aggregate {
                let path = dir.join("outcome_ecdf.svg");
                fs::write(
                    &path,
                    charts::ecdf_chart(
                        label,
                        &gather(values, &treated_rows),
                        &gather(values, &control_rows),
                        &config.treated_label,
                        &config.control_label,
                    ),
                )?;
                artifacts.push(path);
            } else {
                warn!("ECDF plot skipped: no aggregate outcome column");
            }
        }

        let period_names: Vec<String> = cohort
            .period_outcomes
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let treated_means: Vec<f64> = cohort
            .period_outcomes
            .iter()
            .map(|(_, values)| mean(&gather(values, &treated_rows)))
            .collect();
        let control_means: Vec<f64> = cohort
            .period_outcomes
            .iter()
            .map(|(_, values)| mean(&gather(values, &control_rows)))
            .collect();

        if config.views.trend_plot {
            if period_names.is_empty() {
                warn!("Trend plot skipped: no per-period outcome columns");
            } else {
                let path = dir.join("claims_trend.svg");
                fs::write(
                    &path,
                    charts::trend_chart(
                        &period_names,
                        &treated_means,
                        &control_means,
                        &config.treated_label,
                        &config.control_label,
                    ),
                )?;
                artifacts.push(path);
            }
        }

        if config.views.savings_plot {
            if period_names.is_empty() {
                warn!("Savings plot skipped: no per-period outcome columns");
            } else {
                let annotation = format!(
                    "Net savings {:.2} per member over {} pairs ({})",
                    outcomes.savings.per_member, outcomes.savings.pairs, outcomes.savings.basis
                );
                let path = dir.join("savings_by_period.svg");
                fs::write(
                    &path,
                    charts::savings_chart(
                        &period_names,
                        &treated_means,
                        &control_means,
                        &config.treated_label,
                        &config.control_label,
                        &annotation,
                    ),
                )?;
                artifacts.push(path);
            }
        }

        info!("Wrote {} artifacts to {}", artifacts.len(), dir.display());
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::matching::{BalanceChecker, MatchedPair};
    use crate::algorithm::outcome::compare_outcomes;
    use crate::config::ColumnMap;
    use ndarray::Array2;
    use std::path::Path;

    fn cohort() -> Cohort {
        let n = 6;
        Cohort {
            member_ids: (0..n).map(|i| format!("M{i:03}")).collect(),
            treated: vec![true, false, true, false, true, false],
            age: vec![70.0, 68.0, 75.0, 74.0, 66.0, 64.0],
            gender_code: vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
            gender_label: ["M", "F", "M", "F", "M", "F"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            zip_bucket: vec!["303".to_string(); n],
            severity: vec![5.0, 4.0, 8.0, 7.0, 2.0, 3.0],
            covariate_names: vec!["age".to_string(), "severity".to_string()],
            covariates: Array2::from_shape_vec(
                (n, 2),
                vec![
                    70.0, 5.0, 68.0, 4.0, 75.0, 8.0, 74.0, 7.0, 66.0, 2.0, 64.0, 3.0,
                ],
            )
            .unwrap(),
            total_outcome: Some((
                "total_claim".to_string(),
                vec![900.0, 850.0, 2500.0, 2400.0, 400.0, 9000.0],
            )),
            period_outcomes: vec![
                (
                    "claim_y1".to_string(),
                    vec![300.0, 280.0, 800.0, 790.0, 130.0, 3000.0],
                ),
                (
                    "claim_y2".to_string(),
                    vec![600.0, 570.0, 1700.0, 1610.0, 270.0, 6000.0],
                ),
            ],
        }
    }

    fn matching() -> MatchOutcome {
        MatchOutcome {
            pairs: vec![
                MatchedPair {
                    treated_idx: 0,
                    control_idx: 1,
                    distance: 0.01,
                },
                MatchedPair {
                    treated_idx: 2,
                    control_idx: 3,
                    distance: 0.02,
                },
            ],
            is_matched: vec![true, true, true, true, false, false],
            unmatched_treated: 1,
            unmatched_control: 1,
        }
    }

    #[test]
    fn test_emit_writes_enabled_artifacts() {
        let dir = std::env::temp_dir().join(format!(
            "claim_cohort_report_{}",
            std::process::id()
        ));
        let columns =
            ColumnMap::new("member_id", "plan_type", "age", "gender", "zip", "severity_2023")
                .with_total("total_claim")
                .with_periods(&["claim_y1", "claim_y2"]);
        let config = AnalysisConfig::new(Path::new("unused.csv"), columns).with_output_dir(&dir);

        let cohort = cohort();
        let matching = matching();
        let balance = BalanceChecker::new().check(&cohort, &matching).unwrap();
        let outcomes = compare_outcomes(&cohort, &matching).unwrap();

        let artifacts = Reporter::new(&config)
            .emit(&cohort, &matching, &balance, &outcomes)
            .unwrap();

        // Two CSVs plus five charts
        assert_eq!(artifacts.len(), 7);
        for path in &artifacts {
            assert!(path.exists(), "missing artifact {}", path.display());
        }
        let names: Vec<_> = artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"balance_report.csv".to_string()));
        assert!(names.contains(&"outcome_summary.csv".to_string()));
        assert!(names.contains(&"balance_smd.svg".to_string()));
        assert!(names.contains(&"outcome_box.svg".to_string()));
        assert!(names.contains(&"claims_trend.svg".to_string()));
        assert!(names.contains(&"outcome_ecdf.svg".to_string()));
        assert!(names.contains(&"savings_by_period.svg".to_string()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_emit_respects_disabled_views() {
        let dir = std::env::temp_dir().join(format!(
            "claim_cohort_report_min_{}",
            std::process::id()
        ));
        let columns =
            ColumnMap::new("member_id", "plan_type", "age", "gender", "zip", "severity_2023")
                .with_total("total_claim")
                .with_periods(&["claim_y1", "claim_y2"]);
        let mut config =
            AnalysisConfig::new(Path::new("unused.csv"), columns).with_output_dir(&dir);
        config.views.balance_plot = false;
        config.views.box_plot = false;
        config.views.trend_plot = false;
        config.views.ecdf_plot = false;
        config.views.savings_plot = false;

        let cohort = cohort();
        let matching = matching();
        let balance = BalanceChecker::new().check(&cohort, &matching).unwrap();
        let outcomes = compare_outcomes(&cohort, &matching).unwrap();

        let artifacts = Reporter::new(&config)
            .emit(&cohort, &matching, &balance, &outcomes)
            .unwrap();

        // Only the two CSVs remain
        assert_eq!(artifacts.len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
