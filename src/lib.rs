//! Propensity-matched comparison of claim costs between two insurance
//! plan cohorts: covariate preparation, logistic propensity scores,
//! greedy caliper matching, balance diagnostics, outcome tests and
//! report artifacts.

pub mod algorithm;
pub mod cohort;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{AnalysisConfig, CategoryPolicy, ColumnMap, CovariateKind, ReportViews};
pub use error::{CohortError, Result};

// Pipeline stages
pub use algorithm::matching::{
    BalanceChecker, BalanceReport, CaliperScale, MatchOrder, MatchOutcome, MatchSettings,
    MatchedPair, Matcher,
};
pub use algorithm::outcome::{compare_outcomes, mann_whitney_u, welch_t_test, OutcomeReport};
pub use algorithm::propensity::{estimate, PropensityModel};
pub use cohort::{prepare, Cohort};
pub use loader::{load_csv, LoadedDataset, OutcomeCapabilities};
pub use pipeline::{run_analysis, AnalysisArtifacts};
pub use report::Reporter;

// Arrow types
pub use arrow::record_batch::RecordBatch;
