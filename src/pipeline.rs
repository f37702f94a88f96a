//! The analysis pipeline
//!
//! One straight line over an in-memory table: load, prepare, estimate,
//! trim to common support, match, check balance, compare outcomes,
//! report. A run either completes or fails outright.

use log::info;
use std::path::PathBuf;
use std::time::Instant;

use crate::algorithm::matching::{BalanceChecker, BalanceReport, MatchOutcome, Matcher};
use crate::algorithm::outcome::{self, OutcomeReport};
use crate::algorithm::propensity::{self, PropensityModel};
use crate::cohort::{self, Cohort};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::loader;
use crate::report::Reporter;

/// Everything a finished run produced, for callers that want more than
/// the written artifacts.
pub struct AnalysisArtifacts {
    pub cohort: Cohort,
    pub model: PropensityModel,
    pub matching: MatchOutcome,
    pub balance: BalanceReport,
    pub outcomes: OutcomeReport,
    pub written: Vec<PathBuf>,
}

/// Run the full analysis described by one configuration.
///
/// # Errors
///
/// Fails on an invalid configuration, unreadable input, estimation
/// failure, or when no acceptable pairs exist. There is no partial
/// salvage; the error says which stage gave up.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisArtifacts> {
    let start = Instant::now();
    config.validate()?;

    let dataset = loader::load_csv(config)?;
    let mut cohort = cohort::prepare(&dataset, config)?;

    let mut model = propensity::estimate(&cohort)?;
    if let Some(band) = config.support_band {
        let keep = propensity::support_rows(&model.scores, band);
        let dropped = cohort.len() - keep.len();
        if dropped > 0 {
            info!(
                "Support band [{:.2}, {:.2}] drops {dropped} members",
                band.0, band.1
            );
            cohort = cohort.take(&keep);
            model.scores = keep.iter().map(|&row| model.scores[row]).collect();
        }
    }

    let matching = Matcher::new(config.matching).perform_matching(&model.scores, &cohort.treated)?;
    let balance = BalanceChecker::new().check(&cohort, &matching)?;
    let outcomes = outcome::compare_outcomes(&cohort, &matching)?;
    let written = Reporter::new(config).emit(&cohort, &matching, &balance, &outcomes)?;

    info!("Analysis finished in {:?}", start.elapsed());
    Ok(AnalysisArtifacts {
        cohort,
        model,
        matching,
        balance,
        outcomes,
        written,
    })
}
