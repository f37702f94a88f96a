//! Generates a synthetic member cohort and runs the full analysis on it.
//!
//! Run with `cargo run --example synthetic_run`. No real data needed;
//! artifacts land under the system temp directory.

use claim_cohort::config::{AnalysisConfig, ColumnMap};
use claim_cohort::pipeline;
use claim_cohort::utils::synthetic::{self, SyntheticSettings};
use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dir = std::env::temp_dir().join("claim_cohort_demo");
    std::fs::create_dir_all(&dir)?;

    let settings = SyntheticSettings::default();
    let members = synthetic::generate(&settings);
    let input = dir.join("members.csv");
    synthetic::write_csv(&input, &members)?;
    info!(
        "Wrote {} synthetic members to {}",
        members.len(),
        input.display()
    );

    let columns = ColumnMap::new(
        "member_id",
        "plan_type",
        "age",
        "gender",
        "zip",
        "severity_2023",
    )
    .with_total("total_claim")
    .with_periods(&["claim_y1", "claim_y2", "claim_y3"]);
    let config = AnalysisConfig::new(&input, columns).with_output_dir(&dir.join("reports"));

    let artifacts = pipeline::run_analysis(&config)?;
    info!(
        "Matched {} of {} treated members; artifacts in {}",
        artifacts.matching.pairs.len(),
        artifacts.cohort.treated_indices().len(),
        dir.join("reports").display()
    );
    Ok(())
}
