//! End-to-end tests through the library API: clean, merge, prepare, model, report

use mortality_analysis::pipeline::schema::{CAUSE_COLUMNS, TOTAL_DEATHS};
use mortality_analysis::pipeline::*;
use mortality_analysis::report::{ReportParams, RunReport, RunResults};
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

const REGIONS: [&str; 8] = [
    "Alabama", "Alaska", "Arizona", "Ohio", "Oregon", "Texas", "Utah", "Vermont",
];

struct Run {
    merged: MergeOutcome,
    preparation: PreparationReport,
    artifact: ModelArtifact,
}

fn run_pipeline(outliers: Option<OutlierMethod>) -> (Run, Option<OutlierReport>) {
    let mortality = clean_mortality(&create_raw_mortality_dataframe(&REGIONS)).unwrap();
    let population = reshape_population(&create_population_wide_dataframe(&REGIONS)).unwrap();
    let merged = merge(&mortality, &population).unwrap();

    let (table, outlier_report) = match outliers {
        Some(method) => {
            let (filtered, report) = filter_outliers(&merged.table, method).unwrap();
            (filtered, Some(report))
        }
        None => (merged.table.clone(), None),
    };

    let (features, preparation) = prepare(&table, TOTAL_DEATHS, &PrepareConfig::default()).unwrap();
    let params = TreeParams {
        min_samples_split: 6,
        min_samples_leaf: 3,
        ..TreeParams::default()
    };
    let mut modeler = Modeler::new();
    modeler
        .load(&features, TOTAL_DEATHS)
        .unwrap()
        .split(0.2, 42)
        .unwrap()
        .fit(&params)
        .unwrap();
    modeler.evaluate().unwrap();
    let artifact = modeler.into_artifact().unwrap();

    (
        Run {
            merged,
            preparation,
            artifact,
        },
        outlier_report,
    )
}

#[test]
fn test_pipeline_shapes() {
    let (run, _) = run_pipeline(None);

    assert_eq!(run.merged.table.height(), 32);
    assert!(run.merged.diff.is_empty());
    assert_eq!(run.preparation.input_rows, 32);
    assert_eq!(run.preparation.selection.k, 9);
    assert_eq!(run.artifact.feature_names.len(), 9);
    assert_eq!(run.artifact.split.train.len() + run.artifact.split.test.len(), 32);
    assert_eq!(run.artifact.split.test.len(), 7);
    assert!(run.artifact.metrics.mse >= 0.0);
    assert!(run.artifact.metrics.r2 <= 1.0);
}

#[test]
fn test_pipeline_is_deterministic() {
    let (a, _) = run_pipeline(None);
    let (b, _) = run_pipeline(None);

    assert_eq!(a.artifact.split, b.artifact.split);
    assert_eq!(a.artifact.metrics, b.artifact.metrics);
    assert_eq!(a.artifact.tree.nodes(), b.artifact.tree.nodes());
    assert_eq!(
        a.artifact.tree.render(&a.artifact.feature_names, 3),
        b.artifact.tree.render(&b.artifact.feature_names, 3)
    );
}

#[test]
fn test_rates_on_merged_table() {
    let (run, _) = run_pipeline(None);

    let with_rates = with_cause_rates(&with_death_rate(&run.merged.table).unwrap(), &CAUSE_COLUMNS).unwrap();
    assert_eq!(with_rates.height(), 32);
    assert_has_columns(&with_rates, &["Death_Rate"]);
    assert_eq!(with_rates.width(), run.merged.table.width() + 1 + CAUSE_COLUMNS.len());

    let top = top_regions_by_death_rate(&run.merged.table, 3).unwrap();
    assert_eq!(top.len(), 3);
    assert!(top.windows(2).all(|w| w[0].mean_death_rate >= w[1].mean_death_rate));

    let trends = quarterly_rate_trends(&run.merged.table, &CAUSE_COLUMNS).unwrap();
    assert_eq!(trends.len(), 4);

    let correlations = cause_correlations(&run.merged.table, TOTAL_DEATHS).unwrap();
    assert_eq!(correlations.len(), CAUSE_COLUMNS.len());
    assert!(correlations
        .iter()
        .all(|c| c.correlation.is_finite() && c.correlation.abs() <= 1.0));
}

#[test]
fn test_cause_correlations_skip_suppressed_counts() {
    let (run, _) = run_pipeline(None);
    let table = run.merged.table;

    // Blank out some Diabetes counts, as the CDC export does for small values
    let diabetes: Vec<Option<f64>> = table
        .column("Diabetes")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .enumerate()
        .map(|(i, v)| if i % 5 == 0 { None } else { v })
        .collect();
    let mut suppressed = table.clone();
    suppressed
        .with_column(Column::new("Diabetes".into(), diabetes))
        .unwrap();

    // The same rows dropped outright must give the same r
    let keep: Vec<bool> = (0..table.height()).map(|i| i % 5 != 0).collect();
    let complete = table
        .filter(&BooleanChunked::from_slice("keep".into(), &keep))
        .unwrap();

    let find = |rows: &[RankedFeature]| {
        rows.iter()
            .find(|c| c.feature == "Diabetes")
            .map(|c| c.correlation)
            .unwrap()
    };
    let with_nulls = find(&cause_correlations(&suppressed, TOTAL_DEATHS).unwrap());
    let without_rows = find(&cause_correlations(&complete, TOTAL_DEATHS).unwrap());
    assert!((with_nulls - without_rows).abs() < 1e-9, "{} vs {}", with_nulls, without_rows);
}

#[test]
fn test_run_report_serializes_metrics() {
    let (run, outlier_report) = run_pipeline(Some(OutlierMethod::ZScore));
    let top_regions = top_regions_by_death_rate(&run.merged.table, 5).unwrap();
    let trends = quarterly_rate_trends(&run.merged.table, &CAUSE_COLUMNS).unwrap();
    let correlations = cause_correlations(&run.merged.table, TOTAL_DEATHS).unwrap();

    let prepare_config = PrepareConfig::default();
    let tree_params = run.artifact.tree_params.clone();
    let params = ReportParams {
        mortality_source: "mortality.csv",
        population_source: "population.csv",
        target_column: TOTAL_DEATHS,
        prepare: &prepare_config,
        split: run.artifact.split_params,
        tree: &tree_params,
        outliers: Some(OutlierMethod::ZScore),
    };
    let results = RunResults {
        merged_rows: run.merged.table.height(),
        unmatched_rows: run.merged.unmatched_rows,
        region_diff: &run.merged.diff,
        outliers: outlier_report.as_ref(),
        preparation: &run.preparation,
        artifact: &run.artifact,
        cause_correlations: &correlations,
        top_regions: &top_regions,
        quarterly_trends: &trends,
    };

    let json = serde_json::to_value(RunReport::new(&params, &results)).unwrap();
    assert_eq!(json["metadata"]["split"]["seed"], 42);
    assert_eq!(json["model"]["target"], TOTAL_DEATHS);
    assert!(json["model"]["metrics"]["mae"].is_number());
    assert!(json["model"]["tree"]["nodes"].as_array().unwrap().len() >= 1);
    assert_eq!(json["outliers"]["method"], "ZScore");
    assert_eq!(json["top_regions"].as_array().unwrap().len(), 5);

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("report.json");
    mortality_analysis::report::export_run_report(&RunReport::new(&params, &results), &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"feature_importances\""));
}

#[test]
fn test_merged_table_round_trips_to_disk() {
    let (run, _) = run_pipeline(None);
    let dir = tempfile::TempDir::new().unwrap();

    for name in ["merged.csv", "merged.parquet"] {
        let path = dir.path().join(name);
        let mut table = run.merged.table.clone();
        save_dataset(&mut table, &path).unwrap();
        let loaded = load_table(path.to_str().unwrap(), 0).unwrap();
        assert_shape(&loaded, 32, run.merged.table.width());
    }
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("merged.xlsx");
    let mut table = df! { "x" => [1.0f64] }.unwrap();
    assert!(save_dataset(&mut table, &path).is_err());
    assert!(load_table(path.to_str().unwrap(), 0).is_err());
}
