//! Covariate preparation
//!
//! This module turns a loaded member table into the numeric cohort the
//! estimator and matcher run on: treatment and gender codes, ZIP prefix
//! buckets one-hot encoded with the first level dropped, optional
//! percentile clipping of per-period outcomes, and row drops for missing
//! required covariates.

use ::arrow::array::ArrayRef;
use ::arrow::datatypes::DataType;
use log::{info, warn};
use ndarray::{Array2, Axis};

use crate::config::{AnalysisConfig, CategoryPolicy, CovariateKind};
use crate::error::{CohortError, Result};
use crate::loader::LoadedDataset;
use crate::utils::arrow;
use crate::utils::stats::percentile_nearest;

/// A prepared cohort: parallel member columns plus the covariate matrix.
///
/// All vectors share row order; `covariates` is row-aligned with them and
/// contains no missing values.
#[derive(Debug, Clone)]
pub struct Cohort {
    pub member_ids: Vec<String>,
    /// Treatment flag: true for the treated plan arm
    pub treated: Vec<bool>,
    pub age: Vec<f64>,
    /// Gender encoding: 1 male, 0 female, -1 sentinel
    pub gender_code: Vec<f64>,
    /// Raw gender label, kept for report listings
    pub gender_label: Vec<String>,
    /// ZIP prefix bucket, kept for report listings
    pub zip_bucket: Vec<String>,
    pub severity: Vec<f64>,
    /// Covariate column names, aligned with `covariates` columns
    pub covariate_names: Vec<String>,
    /// Row-per-member covariate matrix, no intercept
    pub covariates: Array2<f64>,
    /// Aggregate outcome column (name, values), when present
    pub total_outcome: Option<(String, Vec<f64>)>,
    /// Per-period outcome columns (name, values), in period order
    pub period_outcomes: Vec<(String, Vec<f64>)>,
}

impl Cohort {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    /// Row indices of treated members, in row order.
    #[must_use]
    pub fn treated_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.treated[i]).collect()
    }

    /// Row indices of control members, in row order.
    #[must_use]
    pub fn control_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| !self.treated[i]).collect()
    }

    /// Design matrix for the propensity model: an intercept column of
    /// ones followed by the covariate columns.
    #[must_use]
    pub fn design_matrix(&self) -> Array2<f64> {
        let n = self.len();
        let p = self.covariates.ncols();
        let mut design = Array2::<f64>::ones((n, p + 1));
        design
            .slice_mut(ndarray::s![.., 1..])
            .assign(&self.covariates);
        design
    }

    /// A new cohort containing only the given rows, in the given order.
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Self {
        let pick_f64 = |source: &[f64]| rows.iter().map(|&i| source[i]).collect::<Vec<_>>();
        let pick_str =
            |source: &[String]| rows.iter().map(|&i| source[i].clone()).collect::<Vec<_>>();

        Self {
            member_ids: pick_str(&self.member_ids),
            treated: rows.iter().map(|&i| self.treated[i]).collect(),
            age: pick_f64(&self.age),
            gender_code: pick_f64(&self.gender_code),
            gender_label: pick_str(&self.gender_label),
            zip_bucket: pick_str(&self.zip_bucket),
            severity: pick_f64(&self.severity),
            covariate_names: self.covariate_names.clone(),
            covariates: self.covariates.select(Axis(0), rows),
            total_outcome: self
                .total_outcome
                .as_ref()
                .map(|(name, values)| (name.clone(), pick_f64(values))),
            period_outcomes: self
                .period_outcomes
                .iter()
                .map(|(name, values)| (name.clone(), pick_f64(values)))
                .collect(),
        }
    }

    /// All outcome columns in report order: the aggregate first, then the
    /// periods.
    #[must_use]
    pub fn outcome_columns(&self) -> Vec<(&str, &[f64])> {
        let mut columns: Vec<(&str, &[f64])> = Vec::new();
        if let Some((name, values)) = &self.total_outcome {
            columns.push((name.as_str(), values.as_slice()));
        }
        for (name, values) in &self.period_outcomes {
            columns.push((name.as_str(), values.as_slice()));
        }
        columns
    }

    /// Per-member sum across the period outcome columns, when any exist.
    #[must_use]
    pub fn period_sums(&self) -> Option<Vec<f64>> {
        if self.period_outcomes.is_empty() {
            return None;
        }
        let mut sums = vec![0.0; self.len()];
        for (_, values) in &self.period_outcomes {
            for (sum, v) in sums.iter_mut().zip(values) {
                *sum += v;
            }
        }
        Some(sums)
    }

    /// The aggregate outcome used for member-level views (box plot, ECDF,
    /// outlier listing): the explicit total column when mapped, otherwise
    /// the per-member period sum.
    #[must_use]
    pub fn aggregate_outcome(&self) -> Option<(String, Vec<f64>)> {
        if let Some((name, values)) = &self.total_outcome {
            return Some((name.clone(), values.clone()));
        }
        self.period_sums()
            .map(|sums| ("total across periods".to_string(), sums))
    }

    /// Clip every per-period outcome to its 5th and 95th percentiles.
    ///
    /// The bounds are observed values (nearest-rank percentiles), so
    /// clipping an already clipped column changes nothing.
    pub fn clip_outcomes(&mut self) {
        for (name, values) in &mut self.period_outcomes {
            let lo = percentile_nearest(values, 0.05);
            let hi = percentile_nearest(values, 0.95);
            for v in values.iter_mut() {
                *v = v.clamp(lo, hi);
            }
            info!("Clipped {name} to [{lo:.2}, {hi:.2}]");
        }
    }
}

/// Prepare a cohort from a loaded dataset.
///
/// # Arguments
///
/// * `dataset` - The loaded member table with its outcome capabilities
/// * `config` - The analysis configuration (labels, policies, covariates)
///
/// # Returns
///
/// A `Cohort` with complete covariates; rows with missing required values
/// are dropped and counted in the log.
///
/// # Errors
///
/// Fails on wrongly typed columns, unrecognized plan labels, unrecognized
/// gender labels under the `Fail` policy, or when no usable rows remain.
pub fn prepare(dataset: &LoadedDataset, config: &AnalysisConfig) -> Result<Cohort> {
    let batch = &dataset.batch;
    let cols = &config.columns;

    let member_col = arrow::require_column(batch, &cols.member_id)?;
    let plan_col = arrow::require_column(batch, &cols.plan_type)?;
    let age_col = arrow::require_column(batch, &cols.age)?;
    let gender_col = arrow::require_column(batch, &cols.gender)?;
    let zip_col = arrow::require_column(batch, &cols.zip)?;
    let severity_col = arrow::require_column(batch, &cols.severity)?;

    ensure_string(plan_col, &cols.plan_type)?;
    ensure_string(gender_col, &cols.gender)?;
    ensure_string_like(member_col, &cols.member_id)?;
    ensure_string_like(zip_col, &cols.zip)?;
    ensure_numeric(age_col, &cols.age)?;
    ensure_numeric(severity_col, &cols.severity)?;

    let total_col = match &dataset.capabilities.total {
        Some(name) => {
            let column = arrow::require_column(batch, name)?;
            ensure_numeric(column, name)?;
            Some((name.clone(), column))
        }
        None => None,
    };
    let mut period_cols = Vec::with_capacity(dataset.capabilities.periods.len());
    for name in &dataset.capabilities.periods {
        let column = arrow::require_column(batch, name)?;
        ensure_numeric(column, name)?;
        period_cols.push((name.clone(), column));
    }

    let mut member_ids = Vec::new();
    let mut treated = Vec::new();
    let mut age = Vec::new();
    let mut gender_code = Vec::new();
    let mut gender_label = Vec::new();
    let mut zip_bucket = Vec::new();
    let mut severity = Vec::new();
    let mut total_values = Vec::new();
    let mut period_values: Vec<Vec<f64>> = vec![Vec::new(); period_cols.len()];

    let mut dropped_missing = 0usize;
    let mut dropped_category = 0usize;
    let mut dropped_outcome = 0usize;

    'rows: for row in 0..batch.num_rows() {
        let Some(member_id) = arrow::string_value(member_col, row) else {
            dropped_missing += 1;
            continue;
        };
        let Some(plan) = arrow::string_value(plan_col, row) else {
            dropped_missing += 1;
            continue;
        };
        let is_treated = if plan == config.treated_label {
            true
        } else if plan == config.control_label {
            false
        } else {
            return Err(CohortError::Validation(format!(
                "unrecognized plan type {plan:?} for member {member_id} (expected {:?} or {:?})",
                config.treated_label, config.control_label
            )));
        };
        let Some(member_age) = arrow::f64_value(age_col, row) else {
            dropped_missing += 1;
            continue;
        };
        let Some(gender_raw) = arrow::string_value(gender_col, row) else {
            dropped_missing += 1;
            continue;
        };
        let code = if gender_raw == config.male_label {
            1.0
        } else if gender_raw == config.female_label {
            0.0
        } else {
            match config.category_policy {
                CategoryPolicy::Fail => {
                    return Err(CohortError::Validation(format!(
                        "unrecognized gender {gender_raw:?} for member {member_id}"
                    )));
                }
                CategoryPolicy::Sentinel => -1.0,
                CategoryPolicy::Drop => {
                    dropped_category += 1;
                    continue;
                }
            }
        };
        let Some(zip_raw) = arrow::string_value(zip_col, row) else {
            dropped_missing += 1;
            continue;
        };
        let zip_trimmed = zip_raw.trim();
        if zip_trimmed.is_empty() {
            dropped_missing += 1;
            continue;
        }
        let bucket: String = zip_trimmed.chars().take(config.zip_prefix_len).collect();
        let Some(member_severity) = arrow::f64_value(severity_col, row) else {
            dropped_missing += 1;
            continue;
        };

        let row_total = match &total_col {
            Some((_, column)) => match arrow::f64_value(column, row) {
                Some(v) => Some(v),
                None => {
                    dropped_outcome += 1;
                    continue;
                }
            },
            None => None,
        };
        let mut row_periods = Vec::with_capacity(period_cols.len());
        for (_, column) in &period_cols {
            match arrow::f64_value(column, row) {
                Some(v) => row_periods.push(v),
                None => {
                    dropped_outcome += 1;
                    continue 'rows;
                }
            }
        }

        member_ids.push(member_id);
        treated.push(is_treated);
        age.push(member_age);
        gender_code.push(code);
        gender_label.push(gender_raw);
        zip_bucket.push(bucket);
        severity.push(member_severity);
        if let Some(v) = row_total {
            total_values.push(v);
        }
        for (store, v) in period_values.iter_mut().zip(&row_periods) {
            store.push(*v);
        }
    }

    let n = member_ids.len();
    if n == 0 {
        return Err(CohortError::InsufficientData(
            "no usable rows remain after dropping incomplete members".to_string(),
        ));
    }

    let (covariate_names, covariates) = build_covariates(
        &config.covariates,
        n,
        &age,
        &gender_code,
        &severity,
        &zip_bucket,
    );

    let treated_count = treated.iter().filter(|&&t| t).count();
    info!(
        "Prepared cohort: {} members ({} treated, {} control), {} covariate columns",
        n,
        treated_count,
        n - treated_count,
        covariate_names.len()
    );
    if dropped_missing + dropped_category + dropped_outcome > 0 {
        info!(
            "Dropped rows: {dropped_missing} missing covariates, {dropped_category} unmapped categories, {dropped_outcome} missing outcomes"
        );
    }

    let mut cohort = Cohort {
        member_ids,
        treated,
        age,
        gender_code,
        gender_label,
        zip_bucket,
        severity,
        covariate_names,
        covariates,
        total_outcome: total_col.map(|(name, _)| (name, total_values)),
        period_outcomes: period_cols
            .into_iter()
            .map(|(name, _)| name)
            .zip(period_values)
            .collect(),
    };

    if config.trim_outcomes {
        if cohort.period_outcomes.is_empty() {
            warn!("Outcome trimming requested but no per-period columns are present; skipping");
        } else {
            cohort.clip_outcomes();
        }
    }

    Ok(cohort)
}

fn build_covariates(
    kinds: &[CovariateKind],
    n: usize,
    age: &[f64],
    gender_code: &[f64],
    severity: &[f64],
    zip_bucket: &[String],
) -> (Vec<String>, Array2<f64>) {
    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for kind in kinds {
        match kind {
            CovariateKind::Age => {
                names.push("age".to_string());
                columns.push(age.to_vec());
            }
            CovariateKind::Gender => {
                names.push("gender".to_string());
                columns.push(gender_code.to_vec());
            }
            CovariateKind::Severity => {
                names.push("severity".to_string());
                columns.push(severity.to_vec());
            }
            CovariateKind::Zip => {
                let mut levels: Vec<&String> = zip_bucket.iter().collect();
                levels.sort();
                levels.dedup();
                if levels.len() < 2 {
                    warn!("ZIP bucket has no variation; dropping it from the covariates");
                    continue;
                }
                // First level dropped to avoid collinearity with the intercept
                for level in &levels[1..] {
                    names.push(format!("zip_{level}"));
                    columns.push(
                        zip_bucket
                            .iter()
                            .map(|b| if b == *level { 1.0 } else { 0.0 })
                            .collect(),
                    );
                }
            }
        }
    }

    let mut matrix = Array2::<f64>::zeros((n, columns.len()));
    for (j, column) in columns.iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            matrix[[i, j]] = v;
        }
    }
    (names, matrix)
}

fn ensure_string(column: &ArrayRef, name: &str) -> Result<()> {
    if column.data_type() == &DataType::Utf8 {
        Ok(())
    } else {
        Err(CohortError::Validation(format!(
            "column {name} must contain strings, found {:?}",
            column.data_type()
        )))
    }
}

fn ensure_string_like(column: &ArrayRef, name: &str) -> Result<()> {
    match column.data_type() {
        DataType::Utf8 | DataType::Int32 | DataType::Int64 => Ok(()),
        other => Err(CohortError::Validation(format!(
            "column {name} must contain strings or integers, found {other:?}"
        ))),
    }
}

fn ensure_numeric(column: &ArrayRef, name: &str) -> Result<()> {
    match column.data_type() {
        DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 => Ok(()),
        other => Err(CohortError::Validation(format!(
            "column {name} must be numeric, found {other:?}"
        ))),
    }
}
