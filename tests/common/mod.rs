//! Shared test utilities and fixture generators

#![allow(dead_code)]

use mortality_analysis::pipeline::schema::{CAUSE_COLUMNS, RENAMES};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

/// Quarters used by the small merge scenarios, as (year, quarter)
pub const PERIODS: [(i32, u32); 4] = [(2020, 1), (2020, 2), (2020, 3), (2020, 4)];

/// Deterministic death count for a region/period/cause slot
fn deaths(region: usize, period: usize, slot: usize) -> f64 {
    (100 + 37 * region + 11 * period + 5 * slot + (region * period * 7 + slot * 3) % 13) as f64
}

/// Raw CDC header for a short cause name
fn raw_cause_header(cause: &str) -> &'static str {
    RENAMES
        .iter()
        .find(|(_, short)| *short == cause)
        .map(|(raw, _)| *raw)
        .unwrap()
}

/// A raw CDC-style weekly table: one row per region and period, plus a
/// duplicate of the first row for every region (same quarter, later week).
pub fn create_raw_mortality_dataframe(regions: &[&str]) -> DataFrame {
    let mut jurisdiction = Vec::new();
    let mut week_ending = Vec::new();
    let mut mmwr_year = Vec::new();
    let mut slots: Vec<(usize, usize)> = Vec::new();

    for (r, region) in regions.iter().enumerate() {
        for (p, (year, quarter)) in PERIODS.iter().enumerate() {
            jurisdiction.push(region.to_string());
            week_ending.push(format!("{}-{:02}-07", year, (quarter - 1) * 3 + 1));
            mmwr_year.push(*year);
            slots.push((r, p));
        }
        // Second week of the first quarter: dropped by the dedup
        jurisdiction.push(region.to_string());
        week_ending.push(format!("{}-01-14", PERIODS[0].0));
        mmwr_year.push(PERIODS[0].0);
        slots.push((r, 99));
    }

    let mut columns = vec![
        Column::new("Jurisdiction of Occurrence".into(), jurisdiction),
        Column::new("Week Ending Date".into(), week_ending),
        Column::new("MMWR Year".into(), mmwr_year),
    ];

    let total: Vec<f64> = slots
        .iter()
        .map(|&(r, p)| (0..CAUSE_COLUMNS.len()).map(|s| deaths(r, p, s)).sum::<f64>() + 50.0)
        .collect();
    let natural: Vec<f64> = total.iter().map(|t| t - 20.0).collect();
    columns.push(Column::new("All Cause".into(), total));
    columns.push(Column::new("Natural Cause".into(), natural));

    for (s, cause) in CAUSE_COLUMNS.iter().enumerate() {
        let values: Vec<f64> = slots.iter().map(|&(r, p)| deaths(r, p, s)).collect();
        columns.push(Column::new(raw_cause_header(cause).into(), values));
    }

    let n = slots.len();
    columns.push(Column::new("flag_allcause".into(), vec![None::<&str>; n]));
    columns.push(Column::new("flag_cov19ucod".into(), vec![Some("suppressed"); n]));

    DataFrame::new(columns).unwrap()
}

/// A cleaned MortalityRecord table for `regions` over [`PERIODS`]
pub fn create_mortality_dataframe(regions: &[&str]) -> DataFrame {
    let mut jurisdiction = Vec::new();
    let mut year = Vec::new();
    let mut quarter = Vec::new();
    let mut slots = Vec::new();

    for (r, region) in regions.iter().enumerate() {
        for (p, (y, q)) in PERIODS.iter().enumerate() {
            jurisdiction.push(region.to_string());
            year.push(*y);
            quarter.push(format!("{}Q{}", y, q));
            slots.push((r, p));
        }
    }

    let total: Vec<f64> = slots
        .iter()
        .map(|&(r, p)| (0..CAUSE_COLUMNS.len()).map(|s| deaths(r, p, s)).sum::<f64>() + 50.0)
        .collect();
    let natural: Vec<f64> = total.iter().map(|t| t - 20.0).collect();

    let mut columns = vec![
        Column::new("Jurisdiction".into(), jurisdiction),
        Column::new("Year".into(), year),
        Column::new("Quarter".into(), quarter),
        Column::new("Total Deaths".into(), total),
        Column::new("Natural Deaths".into(), natural),
    ];
    for (s, cause) in CAUSE_COLUMNS.iter().enumerate() {
        let values: Vec<f64> = slots.iter().map(|&(r, p)| deaths(r, p, s)).collect();
        columns.push(Column::new((*cause).into(), values));
    }

    DataFrame::new(columns).unwrap()
}

/// A wide BEA-style population table: one row per region, one column per
/// period labelled `YYYY:Qn`
pub fn create_population_wide_dataframe(regions: &[&str]) -> DataFrame {
    let mut columns = vec![
        Column::new(
            "GeoFips".into(),
            (0..regions.len()).map(|i| format!("{:02}000", i + 1)).collect::<Vec<_>>(),
        ),
        Column::new("GeoName".into(), regions.iter().map(|r| r.to_string()).collect::<Vec<_>>()),
    ];
    for (p, (year, quarter)) in PERIODS.iter().enumerate() {
        let values: Vec<i64> = (0..regions.len())
            .map(|r| 1_000_000 + 250_000 * r as i64 + 1_000 * p as i64)
            .collect();
        columns.push(Column::new(format!("{}:Q{}", year, quarter).into(), values));
    }
    DataFrame::new(columns).unwrap()
}

/// A long PopulationRecord table for `regions` over [`PERIODS`]
pub fn create_population_long_dataframe(regions: &[&str]) -> DataFrame {
    let mut geo = Vec::new();
    let mut quarter = Vec::new();
    let mut population = Vec::new();
    for (r, region) in regions.iter().enumerate() {
        for (p, (y, q)) in PERIODS.iter().enumerate() {
            geo.push(region.to_string());
            quarter.push(format!("{}Q{}", y, q));
            population.push(1_000_000.0 + 250_000.0 * r as f64 + 1_000.0 * p as f64);
        }
    }
    df! {
        "GeoName" => geo,
        "Quarter" => quarter,
        "Total_Population" => population,
    }
    .unwrap()
}

/// A numeric modeling table where `target` depends on `signal` only
pub fn create_modeling_dataframe(rows: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let signal: Vec<f64> = (0..rows).map(|_| rng.gen_range(0.0..100.0)).collect();
    let noise_a: Vec<f64> = (0..rows).map(|_| rng.gen_range(0.0..1.0)).collect();
    let noise_b: Vec<f64> = (0..rows).map(|_| rng.gen_range(-5.0..5.0)).collect();
    let target: Vec<f64> = signal
        .iter()
        .map(|s| (if *s < 50.0 { 10.0 } else { 90.0 }) + rng.gen_range(-1.0..1.0))
        .collect();

    df! {
        "signal" => signal,
        "noise_a" => noise_a,
        "noise_b" => noise_b,
        "target" => target,
    }
    .unwrap()
}

/// Create a temporary directory holding `df` written as CSV under `name`
pub fn create_temp_csv(df: &mut DataFrame, name: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join(name);

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Write `df` as CSV under `name` inside an existing directory
pub fn write_csv(dir: &TempDir, df: &mut DataFrame, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}

/// Assert that a DataFrame has expected shape
pub fn assert_shape(df: &DataFrame, expected_rows: usize, expected_cols: usize) {
    let (rows, cols) = df.shape();
    assert_eq!(rows, expected_rows, "Row count mismatch: expected {}, got {}", expected_rows, rows);
    assert_eq!(cols, expected_cols, "Column count mismatch: expected {}, got {}", expected_cols, cols);
}

/// Column names of a DataFrame as owned strings
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols = column_names(df);
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}

/// Assert that a DataFrame does NOT contain specific columns
pub fn assert_missing_columns(df: &DataFrame, unexpected_cols: &[&str]) {
    let actual_cols = column_names(df);
    for col in unexpected_cols {
        assert!(
            !actual_cols.contains(&col.to_string()),
            "Unexpected column still present: '{}'",
            col
        );
    }
}
