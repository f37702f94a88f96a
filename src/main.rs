use anyhow::Context;
use claim_cohort::config::AnalysisConfig;
use claim_cohort::pipeline;
use log::info;
use std::path::Path;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .context("usage: claim-cohort <config.json>")?;

    info!("Running analysis configured by {config_path}");
    let start = Instant::now();

    let config = AnalysisConfig::from_file(Path::new(&config_path))
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    let artifacts = pipeline::run_analysis(&config)?;

    info!(
        "Matched {} pairs; wrote {} artifacts in {:?}",
        artifacts.matching.pairs.len(),
        artifacts.written.len(),
        start.elapsed()
    );
    Ok(())
}
