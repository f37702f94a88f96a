//! Shared utilities: Arrow value extraction, summary statistics,
//! progress reporting and synthetic cohort generation.

pub mod arrow;
pub mod progress;
pub mod stats;
pub mod synthetic;

pub use arrow::{f64_value, i64_value, require_column, string_value};
pub use stats::{
    mean, median, percentile, percentile_nearest, sample_std, sample_variance,
    standardized_mean_difference,
};
