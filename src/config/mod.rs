//! Analysis configuration
//!
//! One `AnalysisConfig` drives a whole run: where the input lives, how its
//! columns map onto the member record, which covariates enter the
//! propensity model, the matching settings, and which report views to
//! produce. Configurations load from JSON, so each analysis variant is a
//! config file rather than a code change:
//!
//! ```json
//! {
//!   "input_path": "members.csv",
//!   "columns": {
//!     "member_id": "member_id",
//!     "plan_type": "plan_type",
//!     "age": "age",
//!     "gender": "gender",
//!     "zip": "zip",
//!     "severity": "severity_2023",
//!     "periods": ["claim_y1", "claim_y2", "claim_y3"]
//!   },
//!   "matching": { "caliper": 0.05 },
//!   "trim_outcomes": true,
//!   "output_dir": "reports"
//! }
//! ```

use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Deserialize;

use crate::algorithm::matching::MatchSettings;
use crate::error::{CohortError, Result};

/// How unmapped categorical values (typically gender) are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryPolicy {
    /// Fail the run with a validation error
    Fail,
    /// Encode the value as the sentinel code -1 and keep the row
    Sentinel,
    /// Drop the row and count it
    Drop,
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self::Fail
    }
}

/// Member attributes that can enter the propensity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovariateKind {
    Age,
    Gender,
    /// ZIP prefix buckets, one-hot encoded with the first level dropped
    Zip,
    Severity,
}

/// Maps the logical member record onto the input file's column names.
///
/// Nothing downstream ever names a physical column directly; datasets with
/// `total_claim_36m` and datasets with `claim_y1..claim_y3` differ only
/// here.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMap {
    pub member_id: String,
    pub plan_type: String,
    pub age: String,
    pub gender: String,
    pub zip: String,
    pub severity: String,
    /// Aggregate outcome column, when the dataset carries one
    #[serde(default)]
    pub total: Option<String>,
    /// Per-period outcome columns, in period order
    #[serde(default)]
    pub periods: Vec<String>,
}

impl ColumnMap {
    /// Create a mapping for the six required columns; outcome columns are
    /// added with [`Self::with_total`] and [`Self::with_periods`].
    #[must_use]
    pub fn new(
        member_id: &str,
        plan_type: &str,
        age: &str,
        gender: &str,
        zip: &str,
        severity: &str,
    ) -> Self {
        Self {
            member_id: member_id.to_string(),
            plan_type: plan_type.to_string(),
            age: age.to_string(),
            gender: gender.to_string(),
            zip: zip.to_string(),
            severity: severity.to_string(),
            total: None,
            periods: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_total(mut self, column: &str) -> Self {
        self.total = Some(column.to_string());
        self
    }

    #[must_use]
    pub fn with_periods(mut self, columns: &[&str]) -> Self {
        self.periods = columns.iter().map(ToString::to_string).collect();
        self
    }

    /// Required column names, in record order.
    #[must_use]
    pub fn required(&self) -> [&str; 6] {
        [
            &self.member_id,
            &self.plan_type,
            &self.age,
            &self.gender,
            &self.zip,
            &self.severity,
        ]
    }
}

/// Which report views to produce. All views are on by default; a view
/// whose data is absent is skipped with a warning regardless.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReportViews {
    pub balance_plot: bool,
    pub box_plot: bool,
    pub trend_plot: bool,
    pub ecdf_plot: bool,
    pub savings_plot: bool,
    pub top_claims: bool,
    pub outliers: bool,
}

impl Default for ReportViews {
    fn default() -> Self {
        Self {
            balance_plot: true,
            box_plot: true,
            trend_plot: true,
            ecdf_plot: true,
            savings_plot: true,
            top_claims: true,
            outliers: true,
        }
    }
}

/// Full configuration for one analysis run.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Path to the input CSV file
    pub input_path: PathBuf,
    /// Column mapping for the input file
    pub columns: ColumnMap,
    /// Plan type label marking the treated arm
    #[serde(default = "default_treated_label")]
    pub treated_label: String,
    /// Plan type label marking the control arm
    #[serde(default = "default_control_label")]
    pub control_label: String,
    /// Gender label encoded as 1
    #[serde(default = "default_male_label")]
    pub male_label: String,
    /// Gender label encoded as 0
    #[serde(default = "default_female_label")]
    pub female_label: String,
    /// How unmapped gender values are handled
    #[serde(default)]
    pub category_policy: CategoryPolicy,
    /// Covariates entering the propensity model
    #[serde(default = "default_covariates")]
    pub covariates: Vec<CovariateKind>,
    /// Leading digits of the ZIP code used as the geographic bucket
    #[serde(default = "default_zip_prefix_len")]
    pub zip_prefix_len: usize,
    /// Nearest-neighbour matching settings
    #[serde(default)]
    pub matching: MatchSettings,
    /// Retain unmatched members (flagged) instead of dropping them
    #[serde(default)]
    pub keep_unmatched: bool,
    /// Clip per-period outcomes to their 5th/95th percentiles
    #[serde(default)]
    pub trim_outcomes: bool,
    /// Discard members with propensity scores outside [low, high]
    #[serde(default)]
    pub support_band: Option<(f64, f64)>,
    /// Unmatched members with aggregate outcome above this amount are
    /// listed in the outlier view
    #[serde(default)]
    pub outlier_threshold: f64,
    /// Number of highest claims listed per period and arm
    #[serde(default = "default_top_claims")]
    pub top_claims: usize,
    /// Directory receiving SVG and CSV artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Report views to produce
    #[serde(default)]
    pub views: ReportViews,
}

fn default_treated_label() -> String {
    "CSNP".to_string()
}

fn default_control_label() -> String {
    "PPO".to_string()
}

fn default_male_label() -> String {
    "M".to_string()
}

fn default_female_label() -> String {
    "F".to_string()
}

fn default_covariates() -> Vec<CovariateKind> {
    vec![
        CovariateKind::Age,
        CovariateKind::Gender,
        CovariateKind::Zip,
        CovariateKind::Severity,
    ]
}

const fn default_zip_prefix_len() -> usize {
    3
}

const fn default_top_claims() -> usize {
    5
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl AnalysisConfig {
    /// Create a configuration with default settings for the given input.
    #[must_use]
    pub fn new(input_path: &Path, columns: ColumnMap) -> Self {
        Self {
            input_path: input_path.to_path_buf(),
            columns,
            treated_label: default_treated_label(),
            control_label: default_control_label(),
            male_label: default_male_label(),
            female_label: default_female_label(),
            category_policy: CategoryPolicy::default(),
            covariates: default_covariates(),
            zip_prefix_len: default_zip_prefix_len(),
            matching: MatchSettings::default(),
            keep_unmatched: false,
            trim_outcomes: false,
            support_band: None,
            outlier_threshold: 0.0,
            top_claims: default_top_claims(),
            output_dir: default_output_dir(),
            views: ReportViews::default(),
        }
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`Self::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    /// Returns `CohortError::Config` describing the first inconsistency
    /// found.
    pub fn validate(&self) -> Result<()> {
        if self.treated_label == self.control_label {
            return Err(CohortError::Config(
                "treated and control plan labels must differ".to_string(),
            ));
        }
        if self.male_label == self.female_label {
            return Err(CohortError::Config(
                "male and female labels must differ".to_string(),
            ));
        }
        if self.covariates.is_empty() {
            return Err(CohortError::Config(
                "at least one covariate is required".to_string(),
            ));
        }
        if !self.covariates.iter().all_unique() {
            return Err(CohortError::Config(
                "covariate list contains duplicates".to_string(),
            ));
        }
        if !(1..=5).contains(&self.zip_prefix_len) {
            return Err(CohortError::Config(format!(
                "zip_prefix_len must be between 1 and 5, got {}",
                self.zip_prefix_len
            )));
        }
        if self.columns.total.is_none() && self.columns.periods.is_empty() {
            return Err(CohortError::Config(
                "no outcome columns configured: set columns.total and/or columns.periods"
                    .to_string(),
            ));
        }
        if let Some((low, high)) = self.support_band {
            if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low >= high {
                return Err(CohortError::Config(format!(
                    "support_band must satisfy 0 <= low < high <= 1, got [{low}, {high}]"
                )));
            }
        }
        if self.top_claims == 0 {
            return Err(CohortError::Config(
                "top_claims must be at least 1".to_string(),
            ));
        }
        self.matching.validate()
    }

    #[must_use]
    pub fn with_matching(mut self, matching: MatchSettings) -> Self {
        self.matching = matching;
        self
    }

    #[must_use]
    pub fn with_covariates(mut self, covariates: &[CovariateKind]) -> Self {
        self.covariates = covariates.to_vec();
        self
    }

    #[must_use]
    pub fn with_category_policy(mut self, policy: CategoryPolicy) -> Self {
        self.category_policy = policy;
        self
    }

    #[must_use]
    pub fn with_trim_outcomes(mut self, trim: bool) -> Self {
        self.trim_outcomes = trim;
        self
    }

    #[must_use]
    pub fn with_keep_unmatched(mut self, keep: bool) -> Self {
        self.keep_unmatched = keep;
        self
    }

    #[must_use]
    pub fn with_support_band(mut self, low: f64, high: f64) -> Self {
        self.support_band = Some((low, high));
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        self.output_dir = dir.to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::matching::{CaliperScale, MatchOrder};

    fn minimal_json() -> &'static str {
        r#"{
            "input_path": "members.csv",
            "columns": {
                "member_id": "member_id",
                "plan_type": "plan_type",
                "age": "age",
                "gender": "gender",
                "zip": "zip",
                "severity": "severity_2023",
                "total": "total_claim_36m"
            }
        }"#
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: AnalysisConfig = serde_json::from_str(minimal_json()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.treated_label, "CSNP");
        assert_eq!(config.control_label, "PPO");
        assert_eq!(config.zip_prefix_len, 3);
        assert_eq!(config.category_policy, CategoryPolicy::Fail);
        assert_eq!(config.covariates.len(), 4);
        assert!((config.matching.caliper - 0.05).abs() < 1e-12);
        assert_eq!(config.matching.scale, CaliperScale::Probability);
        assert_eq!(config.matching.order, MatchOrder::DataOrder);
        assert!(!config.keep_unmatched);
        assert!(!config.trim_outcomes);
        assert_eq!(config.top_claims, 5);
        assert!(config.views.balance_plot);
    }

    #[test]
    fn test_full_config_round_trip() {
        let json = r#"{
            "input_path": "claims.csv",
            "columns": {
                "member_id": "id",
                "plan_type": "plan",
                "age": "age",
                "gender": "sex",
                "zip": "zip5",
                "severity": "severity_jan",
                "periods": ["claim_y1", "claim_y2", "claim_y3"]
            },
            "category_policy": "sentinel",
            "covariates": ["age", "severity"],
            "matching": { "caliper": 0.1, "scale": "logit", "order": "ascending_score" },
            "keep_unmatched": true,
            "trim_outcomes": true,
            "support_band": [0.01, 0.99],
            "top_claims": 3,
            "views": { "ecdf_plot": false }
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.category_policy, CategoryPolicy::Sentinel);
        assert_eq!(
            config.covariates,
            vec![CovariateKind::Age, CovariateKind::Severity]
        );
        assert_eq!(config.matching.scale, CaliperScale::Logit);
        assert_eq!(config.matching.order, MatchOrder::AscendingScore);
        assert_eq!(config.support_band, Some((0.01, 0.99)));
        assert_eq!(config.columns.periods.len(), 3);
        assert!(!config.views.ecdf_plot);
        assert!(config.views.balance_plot);
    }

    #[test]
    fn test_validate_rejects_inconsistencies() {
        let base: AnalysisConfig = serde_json::from_str(minimal_json()).unwrap();

        let mut no_outcomes = base.clone();
        no_outcomes.columns.total = None;
        assert!(no_outcomes.validate().is_err());

        let mut bad_prefix = base.clone();
        bad_prefix.zip_prefix_len = 0;
        assert!(bad_prefix.validate().is_err());

        let mut bad_band = base.clone();
        bad_band.support_band = Some((0.9, 0.1));
        assert!(bad_band.validate().is_err());

        let mut dup_covariates = base.clone();
        dup_covariates.covariates = vec![CovariateKind::Age, CovariateKind::Age];
        assert!(dup_covariates.validate().is_err());

        let mut bad_caliper = base;
        bad_caliper.matching.caliper = -0.5;
        assert!(bad_caliper.validate().is_err());
    }
}
