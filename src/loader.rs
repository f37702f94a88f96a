//! CSV member table loading

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::record_batch::RecordBatch;
use arrow::compute::concat_batches;
use log::{info, warn};
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use crate::config::AnalysisConfig;
use crate::error::{CohortError, Result};

/// Outcome columns confirmed present in the input file.
///
/// Configured outcome columns that the file does not carry are dropped
/// here, once, so downstream stages never re-check the schema.
#[derive(Debug, Clone)]
pub struct OutcomeCapabilities {
    /// Aggregate outcome column name, when mapped and present
    pub total: Option<String>,
    /// Per-period outcome column names, in configured order
    pub periods: Vec<String>,
}

impl OutcomeCapabilities {
    #[must_use]
    pub fn any(&self) -> bool {
        self.total.is_some() || !self.periods.is_empty()
    }
}

/// A loaded member table: one combined record batch plus the outcome
/// columns it actually carries.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub batch: RecordBatch,
    pub capabilities: OutcomeCapabilities,
}

/// Load the member table named by the configuration.
///
/// The schema is inferred from the file, required columns are checked up
/// front, and only the mapped columns are read. Missing outcome columns
/// are logged and skipped; missing required columns fail the run.
///
/// # Arguments
///
/// * `config` - The analysis configuration naming the file and columns
///
/// # Returns
///
/// A `LoadedDataset` with all rows in one record batch.
///
/// # Errors
///
/// Fails when the file cannot be read, a required column is absent, no
/// outcome column is present, or the file has no data rows.
pub fn load_csv(config: &AnalysisConfig) -> Result<LoadedDataset> {
    let path = &config.input_path;
    info!("Loading member table from {}", path.display());
    let mut file = open_input(path)?;

    // Infer the schema from the whole file, then rewind for the read
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, None)?;
    file.rewind()?;

    for name in config.columns.required() {
        if schema.index_of(name).is_err() {
            return Err(CohortError::MissingColumn(name.to_string()));
        }
    }

    let total = match &config.columns.total {
        Some(name) if schema.index_of(name).is_ok() => Some(name.clone()),
        Some(name) => {
            warn!("Total outcome column {name} not found in the input; skipping it");
            None
        }
        None => None,
    };
    let mut periods = Vec::new();
    for name in &config.columns.periods {
        if schema.index_of(name).is_ok() {
            periods.push(name.clone());
        } else {
            warn!("Period outcome column {name} not found in the input; skipping it");
        }
    }
    let capabilities = OutcomeCapabilities { total, periods };
    if !capabilities.any() {
        return Err(CohortError::Validation(
            "no outcome column is present in the input; map a total or at least one period column"
                .to_string(),
        ));
    }

    // Project to the mapped columns only
    let mut projection = Vec::new();
    for name in config.columns.required() {
        projection.push(schema.index_of(name)?);
    }
    if let Some(name) = &capabilities.total {
        projection.push(schema.index_of(name)?);
    }
    for name in &capabilities.periods {
        projection.push(schema.index_of(name)?);
    }
    projection.sort_unstable();
    projection.dedup();

    let projected_schema = Arc::new(schema.project(&projection)?);
    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .with_projection(projection)
        .build(file)?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    let batch = concat_batches(&projected_schema, &batches)?;
    if batch.num_rows() == 0 {
        return Err(CohortError::InsufficientData(format!(
            "input file {} contains no data rows",
            path.display()
        )));
    }

    info!(
        "Loaded {} rows, {} columns from {}",
        batch.num_rows(),
        batch.num_columns(),
        path.display()
    );
    Ok(LoadedDataset {
        batch,
        capabilities,
    })
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| {
        CohortError::Io(std::io::Error::new(
            source.kind(),
            format!("{}: {source}", path.display()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMap;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_temp_csv(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}_{name}.csv", "claim_cohort", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn columns() -> ColumnMap {
        ColumnMap::new("member_id", "plan_type", "age", "gender", "zip", "severity_2023")
            .with_total("total_claim")
            .with_periods(&["claim_y1", "claim_y2"])
    }

    #[test]
    fn test_load_projects_mapped_columns() {
        let path = write_temp_csv(
            "load_basic",
            "member_id,plan_type,age,gender,zip,severity_2023,claim_y1,claim_y2,total_claim,unused\n\
             M000,CSNP,67,F,30301,5,1200.50,1300.25,2500.75,x\n\
             M001,PPO,54,M,30312,2,800.00,750.00,1550.00,y\n",
        );
        let config = AnalysisConfig::new(&path, columns());

        let dataset = load_csv(&config).unwrap();
        assert_eq!(dataset.batch.num_rows(), 2);
        // The unmapped column is projected away
        assert_eq!(dataset.batch.num_columns(), 9);
        assert!(dataset.batch.column_by_name("unused").is_none());
        assert_eq!(dataset.capabilities.total.as_deref(), Some("total_claim"));
        assert_eq!(dataset.capabilities.periods, vec!["claim_y1", "claim_y2"]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_required_column_fails() {
        let path = write_temp_csv(
            "load_missing_required",
            "member_id,age,gender,zip,severity_2023,total_claim\n\
             M000,67,F,30301,5,2500.75\n",
        );
        let config = AnalysisConfig::new(&path, columns());

        let result = load_csv(&config);
        assert!(matches!(result, Err(CohortError::MissingColumn(name)) if name == "plan_type"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_outcome_columns_are_skipped() {
        let path = write_temp_csv(
            "load_missing_outcome",
            "member_id,plan_type,age,gender,zip,severity_2023,claim_y1\n\
             M000,CSNP,67,F,30301,5,1200.50\n",
        );
        let config = AnalysisConfig::new(&path, columns());

        let dataset = load_csv(&config).unwrap();
        assert!(dataset.capabilities.total.is_none());
        assert_eq!(dataset.capabilities.periods, vec!["claim_y1"]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_no_outcome_column_at_all_fails() {
        let path = write_temp_csv(
            "load_no_outcome",
            "member_id,plan_type,age,gender,zip,severity_2023\n\
             M000,CSNP,67,F,30301,5\n",
        );
        let config = AnalysisConfig::new(&path, columns());

        let result = load_csv(&config);
        assert!(matches!(result, Err(CohortError::Validation(_))));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_file_fails() {
        let path = write_temp_csv(
            "load_empty",
            "member_id,plan_type,age,gender,zip,severity_2023,total_claim\n",
        );
        let config = AnalysisConfig::new(&path, columns());

        let result = load_csv(&config);
        assert!(matches!(result, Err(CohortError::InsufficientData(_))));

        std::fs::remove_file(&path).unwrap();
    }
}
