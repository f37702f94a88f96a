//! Prints the highest claims per period and arm for a synthetic cohort.
//!
//! A trimmed-down variant of the full run: load, prepare, estimate and
//! match, then render only the top-claims view. Run with
//! `cargo run --example top_claims`.

use claim_cohort::algorithm::matching::Matcher;
use claim_cohort::algorithm::propensity;
use claim_cohort::cohort;
use claim_cohort::config::{AnalysisConfig, ColumnMap};
use claim_cohort::loader;
use claim_cohort::report::tables;
use claim_cohort::utils::synthetic::{self, SyntheticSettings};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dir = std::env::temp_dir().join("claim_cohort_top_claims");
    std::fs::create_dir_all(&dir)?;
    let input = dir.join("members.csv");
    let members = synthetic::generate(&SyntheticSettings {
        members: 400,
        ..SyntheticSettings::default()
    });
    synthetic::write_csv(&input, &members)?;

    // Period columns only; the savings basis falls back to their sum
    let columns = ColumnMap::new(
        "member_id",
        "plan_type",
        "age",
        "gender",
        "zip",
        "severity_2023",
    )
    .with_periods(&["claim_y1", "claim_y2", "claim_y3"]);
    let config = AnalysisConfig::new(&input, columns);

    let dataset = loader::load_csv(&config)?;
    let cohort = cohort::prepare(&dataset, &config)?;
    let model = propensity::estimate(&cohort)?;
    let matching =
        Matcher::new(config.matching).perform_matching(&model.scores, &cohort.treated)?;

    match tables::top_claims_tables(
        &cohort,
        &matching,
        config.top_claims,
        &config.treated_label,
        &config.control_label,
    ) {
        Some(table) => println!("{table}"),
        None => println!("no per-period outcome columns mapped"),
    }
    Ok(())
}
