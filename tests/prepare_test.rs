use claim_cohort::cohort;
use claim_cohort::config::{AnalysisConfig, CategoryPolicy, ColumnMap, CovariateKind};
use claim_cohort::error::CohortError;
use claim_cohort::loader;
use std::fs;
use std::path::PathBuf;

fn write_temp_csv(tag: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "claim_cohort_prepare_{tag}_{}.csv",
        std::process::id()
    ));
    fs::write(&path, content).unwrap();
    path
}

fn columns() -> ColumnMap {
    ColumnMap::new("member_id", "plan_type", "age", "gender", "zip", "severity")
        .with_total("total_claim")
}

#[test]
fn test_load_and_prepare_encodes_buckets_and_drops_incomplete_rows() {
    // M002 has no age, M005 has an unmapped gender
    let path = write_temp_csv(
        "messy",
        "member_id,plan_type,age,gender,zip,severity,total_claim\n\
         M000,CSNP,72,F,30301,6,2100.00\n\
         M001,PPO,69,M,30312,5,1800.50\n\
         M002,CSNP,,F,30301,4,900.00\n\
         M003,PPO,55,F,31401,2,400.00\n\
         M004,CSNP,81,M,31419,8,3200.75\n\
         M005,PPO,60,X,30301,3,700.00\n",
    );

    let config = AnalysisConfig::new(&path, columns())
        .with_category_policy(CategoryPolicy::Sentinel);
    let dataset = loader::load_csv(&config).unwrap();
    let cohort = cohort::prepare(&dataset, &config).unwrap();

    // Test row drops: only the missing age goes; the sentinel keeps M005
    assert_eq!(cohort.len(), 5);
    assert!(!cohort.member_ids.contains(&"M002".to_string()));
    let m005 = cohort.member_ids.iter().position(|m| m == "M005").unwrap();
    assert_eq!(cohort.gender_code[m005], -1.0);

    // Test zip bucketing: numeric zips become 3-digit prefixes
    assert!(cohort.zip_bucket.iter().all(|b| b.len() == 3));
    assert!(cohort.covariate_names.contains(&"zip_314".to_string()));
    // First bucket level is the dropped baseline
    assert!(!cohort.covariate_names.contains(&"zip_303".to_string()));

    // Test outcome carry-through
    let (name, values) = cohort.total_outcome.as_ref().unwrap();
    assert_eq!(name, "total_claim");
    assert_eq!(values.len(), cohort.len());

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_drop_policy_removes_unmapped_categories() {
    let path = write_temp_csv(
        "drop_policy",
        "member_id,plan_type,age,gender,zip,severity,total_claim\n\
         M000,CSNP,72,F,30301,6,2100.00\n\
         M001,PPO,69,U,30312,5,1800.50\n\
         M002,PPO,66,M,30312,4,1500.00\n",
    );

    let config = AnalysisConfig::new(&path, columns())
        .with_category_policy(CategoryPolicy::Drop);
    let dataset = loader::load_csv(&config).unwrap();
    let cohort = cohort::prepare(&dataset, &config).unwrap();

    assert_eq!(cohort.len(), 2);
    assert!(!cohort.member_ids.contains(&"M001".to_string()));

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_fail_policy_is_fatal_on_unknown_gender() {
    let path = write_temp_csv(
        "fail_policy",
        "member_id,plan_type,age,gender,zip,severity,total_claim\n\
         M000,CSNP,72,F,30301,6,2100.00\n\
         M001,PPO,69,U,30312,5,1800.50\n",
    );

    let config = AnalysisConfig::new(&path, columns());
    let dataset = loader::load_csv(&config).unwrap();
    let result = cohort::prepare(&dataset, &config);

    assert!(matches!(result, Err(CohortError::Validation(_))));

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_covariate_subset_controls_matrix_columns() {
    let path = write_temp_csv(
        "subset",
        "member_id,plan_type,age,gender,zip,severity,total_claim\n\
         M000,CSNP,72,F,30301,6,2100.00\n\
         M001,PPO,69,M,30312,5,1800.50\n",
    );

    let config = AnalysisConfig::new(&path, columns())
        .with_covariates(&[CovariateKind::Age, CovariateKind::Severity]);
    let dataset = loader::load_csv(&config).unwrap();
    let cohort = cohort::prepare(&dataset, &config).unwrap();

    assert_eq!(cohort.covariate_names, vec!["age", "severity"]);
    assert_eq!(cohort.covariates.ncols(), 2);
    assert_eq!(cohort.covariates[[0, 0]], 72.0);
    assert_eq!(cohort.covariates[[1, 1]], 5.0);

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_unknown_plan_label_is_always_fatal() {
    let path = write_temp_csv(
        "bad_plan",
        "member_id,plan_type,age,gender,zip,severity,total_claim\n\
         M000,CSNP,72,F,30301,6,2100.00\n\
         M001,HMO,69,M,30312,5,1800.50\n",
    );

    // Even the most permissive category policy does not extend to plans
    let config = AnalysisConfig::new(&path, columns())
        .with_category_policy(CategoryPolicy::Sentinel);
    let dataset = loader::load_csv(&config).unwrap();
    let result = cohort::prepare(&dataset, &config);

    assert!(matches!(result, Err(CohortError::Validation(_))));

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_trimming_clips_period_columns_to_inner_percentiles() {
    let mut content = String::from("member_id,plan_type,age,gender,zip,severity,claim_y1\n");
    for i in 0..100 {
        let plan = if i % 2 == 0 { "CSNP" } else { "PPO" };
        content.push_str(&format!(
            "M{i:03},{plan},{},F,30301,4,{}.00\n",
            50 + i % 30,
            (i + 1) * 100
        ));
    }
    let path = write_temp_csv("trim", &content);

    let columns = ColumnMap::new("member_id", "plan_type", "age", "gender", "zip", "severity")
        .with_periods(&["claim_y1"]);
    let config = AnalysisConfig::new(&path, columns).with_trim_outcomes(true);
    let dataset = loader::load_csv(&config).unwrap();
    let cohort = cohort::prepare(&dataset, &config).unwrap();

    let (_, values) = &cohort.period_outcomes[0];
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    // Values 100..10000 clip to the 5th and 95th nearest-rank bounds
    assert_eq!(min, 500.0);
    assert_eq!(max, 9500.0);

    fs::remove_file(&path).unwrap();
}
