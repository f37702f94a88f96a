//! Propensity score estimation
//!
//! Fits a logistic regression of treatment on the covariates by
//! iteratively reweighted least squares and exposes the fitted
//! probabilities as matching scores. The normal equations are solved
//! with an in-crate Cholesky factorization; a failed pivot is reported
//! as rank deficiency rather than ground through.

use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use std::time::Instant;

use crate::cohort::Cohort;
use crate::error::{CohortError, Result};
use crate::utils::stats::clamp_probability;

/// Iteration cap for the IRLS loop.
pub const MAX_ITERATIONS: usize = 25;
/// Convergence threshold on the log-likelihood change.
pub const TOLERANCE: f64 = 1e-8;

/// A fitted propensity model.
#[derive(Debug, Clone)]
pub struct PropensityModel {
    /// Fitted treatment probability per member, aligned with cohort rows
    pub scores: Vec<f64>,
    /// Coefficients, intercept first, then the covariate columns
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub log_likelihood: f64,
}

impl PropensityModel {
    /// Coefficients paired with their column names, intercept first.
    #[must_use]
    pub fn named_coefficients(&self, covariate_names: &[String]) -> Vec<(String, f64)> {
        std::iter::once("intercept".to_string())
            .chain(covariate_names.iter().cloned())
            .zip(self.coefficients.iter().copied())
            .collect()
    }
}

/// Fit the propensity model for a cohort.
///
/// # Arguments
///
/// * `cohort` - The prepared cohort with its covariate matrix
///
/// # Returns
///
/// A `PropensityModel` with one score per cohort row. Scores are clamped
/// away from exactly 0 and 1 so the logit transform stays finite.
///
/// # Errors
///
/// Fails when every member is in the same arm or when the weighted
/// design matrix is rank deficient (constant or collinear covariates,
/// or perfectly separated arms).
pub fn estimate(cohort: &Cohort) -> Result<PropensityModel> {
    let start = Instant::now();
    let n = cohort.len();
    let treated_count = cohort.treated.iter().filter(|&&t| t).count();
    if treated_count == 0 || treated_count == n {
        return Err(CohortError::Estimation(format!(
            "cannot fit a propensity model: all {n} members are in the same arm"
        )));
    }

    let x = cohort.design_matrix();
    let y = Array1::from_iter(cohort.treated.iter().map(|&t| f64::from(u8::from(t))));
    let p = x.ncols();

    let mut beta = Array1::<f64>::zeros(p);
    let mut log_likelihood = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 1..=MAX_ITERATIONS {
        iterations = iteration;

        let eta = x.dot(&beta);
        let mu = eta.mapv(sigmoid);
        // Weights floored so nearly separated fits stay solvable
        let w = mu.mapv(|m| (m * (1.0 - m)).max(1e-10));
        let z = &eta + &((&y - &mu) / &w);

        let weighted = &x * &w.view().insert_axis(Axis(1));
        let xtwx = x.t().dot(&weighted);
        let xtwz = weighted.t().dot(&z);
        beta = cholesky_solve(&xtwx, &xtwz)?;

        let updated = x.dot(&beta).mapv(sigmoid);
        let ll: f64 = y
            .iter()
            .zip(updated.iter())
            .map(|(&yi, &mi)| {
                let m = clamp_probability(mi);
                yi.mul_add(m.ln(), (1.0 - yi) * (1.0 - m).ln())
            })
            .sum();

        if (ll - log_likelihood).abs() < TOLERANCE {
            log_likelihood = ll;
            converged = true;
            break;
        }
        log_likelihood = ll;
    }

    if !converged {
        warn!(
            "Propensity fit did not converge after {MAX_ITERATIONS} iterations; using the last estimate"
        );
    }

    let scores: Vec<f64> = x
        .dot(&beta)
        .iter()
        .map(|&e| clamp_probability(sigmoid(e)))
        .collect();

    info!(
        "Fitted propensity model in {} iterations ({:?}), log-likelihood {:.4}",
        iterations,
        start.elapsed(),
        log_likelihood
    );

    Ok(PropensityModel {
        scores,
        coefficients: beta.to_vec(),
        iterations,
        converged,
        log_likelihood,
    })
}

/// Row indices whose score lies inside the common support band.
#[must_use]
pub fn support_rows(scores: &[f64], band: (f64, f64)) -> Vec<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score >= band.0 && score <= band.1)
        .map(|(row, _)| row)
        .collect()
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// Solve `a * x = b` for symmetric positive definite `a`.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    // Pivot tolerance relative to the largest diagonal entry
    let scale = a.diag().iter().copied().fold(1.0_f64, f64::max);
    let tolerance = 1e-12 * scale;

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= tolerance {
                    return Err(CohortError::Estimation(
                        "the weighted design matrix is rank deficient; a covariate may be \
                         constant or collinear, or the arms may be perfectly separated"
                            .to_string(),
                    ));
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // Forward substitution, then back substitution on the transpose
    let mut forward = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * forward[k];
        }
        forward[i] = sum / l[[i, i]];
    }
    let mut solution = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = forward[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * solution[k];
        }
        solution[i] = sum / l[[i, i]];
    }
    Ok(solution)
}
