//! Greedy nearest-neighbour matcher
//!
//! This module implements the Matcher struct which pairs each treated
//! member with the closest unused control on the propensity scale,
//! subject to the caliper. Matching is 1:1, without replacement, and
//! fully deterministic.

use std::time::Instant;

use log::info;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::algorithm::matching::criteria::{CaliperScale, MatchOrder, MatchSettings};
use crate::error::{CohortError, Result};
use crate::utils::progress;
use crate::utils::stats::logit;

/// One accepted treated-control pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair {
    /// Cohort row index of the treated member
    pub treated_idx: usize,
    /// Cohort row index of the control member
    pub control_idx: usize,
    /// Score distance on the configured caliper scale
    pub distance: f64,
}

/// Result of one matching run, aligned with the cohort it was run on.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Accepted pairs, in treated processing order
    pub pairs: Vec<MatchedPair>,
    /// Per-row matched flag
    pub is_matched: Vec<bool>,
    /// Treated members left without an acceptable control
    pub unmatched_treated: usize,
    /// Controls never claimed by a treated member
    pub unmatched_control: usize,
}

impl MatchOutcome {
    /// Row indices of matched treated members, in pair order.
    #[must_use]
    pub fn matched_treated(&self) -> Vec<usize> {
        self.pairs.iter().map(|p| p.treated_idx).collect()
    }

    /// Row indices of matched controls, in pair order.
    #[must_use]
    pub fn matched_control(&self) -> Vec<usize> {
        self.pairs.iter().map(|p| p.control_idx).collect()
    }

    /// Row indices of all matched members, treated then controls.
    #[must_use]
    pub fn matched_rows(&self) -> Vec<usize> {
        let mut rows = self.matched_treated();
        rows.extend(self.matched_control());
        rows
    }
}

/// Matcher for pairing treated members with controls
#[derive(Debug)]
pub struct Matcher {
    settings: MatchSettings,
}

impl Matcher {
    /// Create a new matcher with the given settings
    #[must_use]
    pub const fn new(settings: MatchSettings) -> Self {
        Self { settings }
    }

    /// Perform matching over one cohort.
    ///
    /// # Arguments
    ///
    /// * `scores` - Propensity scores, one per cohort row, in (0, 1)
    /// * `treated` - Treatment flags aligned with `scores`
    ///
    /// # Returns
    ///
    /// A `MatchOutcome` with the accepted pairs and per-row flags.
    ///
    /// # Errors
    ///
    /// Fails when the inputs are misaligned or non-finite, when either arm
    /// is empty, or when no pair at all fits inside the caliper.
    pub fn perform_matching(&self, scores: &[f64], treated: &[bool]) -> Result<MatchOutcome> {
        let start_time = Instant::now();
        self.settings.validate()?;

        if scores.len() != treated.len() {
            return Err(CohortError::Validation(format!(
                "scores ({}) and treatment flags ({}) are misaligned",
                scores.len(),
                treated.len()
            )));
        }

        // Work on the configured caliper scale
        let distances: Vec<f64> = match self.settings.scale {
            CaliperScale::Probability => scores.to_vec(),
            CaliperScale::Logit => scores.iter().map(|&p| logit(p)).collect(),
        };
        if distances.iter().any(|d| !d.is_finite()) {
            return Err(CohortError::Validation(
                "propensity scores must be finite and strictly inside (0, 1)".to_string(),
            ));
        }

        let mut treated_rows: Vec<usize> = Vec::new();
        let mut control_rows: Vec<usize> = Vec::new();
        for (idx, &flag) in treated.iter().enumerate() {
            if flag {
                treated_rows.push(idx);
            } else {
                control_rows.push(idx);
            }
        }
        if treated_rows.is_empty() || control_rows.is_empty() {
            return Err(CohortError::InsufficientData(format!(
                "matching needs both arms populated, got {} treated and {} controls",
                treated_rows.len(),
                control_rows.len()
            )));
        }

        info!(
            "Matching {} treated members against a pool of {} controls (caliper {})",
            treated_rows.len(),
            control_rows.len(),
            self.settings.caliper
        );

        // Deterministic processing order; score ties fall back to row order
        match self.settings.order {
            MatchOrder::DataOrder => {}
            MatchOrder::AscendingScore => treated_rows
                .sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b))),
            MatchOrder::DescendingScore => treated_rows
                .sort_by(|&a, &b| distances[b].total_cmp(&distances[a]).then(a.cmp(&b))),
        }

        let pb = progress::stage_progress_bar(treated_rows.len() as u64, "Matching members");

        let mut used_controls: FxHashSet<usize> = FxHashSet::default();
        let mut pairs: Vec<MatchedPair> = Vec::with_capacity(treated_rows.len());
        let mut is_matched = vec![false; scores.len()];

        for (step, &treated_row) in treated_rows.iter().enumerate() {
            let treated_score = distances[treated_row];

            // Controls inside the caliper, in ascending row order
            let mut eligible = SmallVec::<[usize; 32]>::new();
            for &control_row in &control_rows {
                if used_controls.contains(&control_row) {
                    continue;
                }
                if (treated_score - distances[control_row]).abs() <= self.settings.caliper {
                    eligible.push(control_row);
                }
            }

            // Nearest eligible control; strict comparison keeps the lowest
            // row index on distance ties
            let mut best: Option<(usize, f64)> = None;
            for &control_row in &eligible {
                let gap = (treated_score - distances[control_row]).abs();
                if best.is_none_or(|(_, best_gap)| gap < best_gap) {
                    best = Some((control_row, gap));
                }
            }

            if let Some((control_row, gap)) = best {
                used_controls.insert(control_row);
                is_matched[treated_row] = true;
                is_matched[control_row] = true;
                pairs.push(MatchedPair {
                    treated_idx: treated_row,
                    control_idx: control_row,
                    distance: gap,
                });
            }

            pb.inc(1);
            if step % 100 == 0 {
                pb.set_message(format!("Found {} matches", pairs.len()));
            }
        }

        progress::finish_progress_bar(&pb, "Matching complete");

        if pairs.is_empty() {
            return Err(CohortError::InsufficientData(
                "no treated-control pair fits inside the caliper".to_string(),
            ));
        }

        let unmatched_treated = treated_rows.len() - pairs.len();
        let unmatched_control = control_rows.len() - pairs.len();
        let elapsed = start_time.elapsed();

        info!(
            "Matching complete: {} pairs, {} treated and {} controls unmatched, in {:.2?}",
            pairs.len(),
            unmatched_treated,
            unmatched_control,
            elapsed
        );

        Ok(MatchOutcome {
            pairs,
            is_matched,
            unmatched_treated,
            unmatched_control,
        })
    }
}
