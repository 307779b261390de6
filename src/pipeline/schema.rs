//! Column names shared by the cleaning, merging and preparation stages

use polars::prelude::*;

use super::error::{PipelineError, Result, Stage};

pub const JURISDICTION: &str = "Jurisdiction";
pub const YEAR: &str = "Year";
pub const MONTH: &str = "Month";
pub const DAY: &str = "Day";
pub const QUARTER: &str = "Quarter";
pub const TOTAL_DEATHS: &str = "Total Deaths";
pub const NATURAL_DEATHS: &str = "Natural Deaths";
pub const TOTAL_POPULATION: &str = "Total_Population";
pub const DEATH_RATE: &str = "Death_Rate";

/// Raw CDC columns consumed before the rename step
pub const RAW_JURISDICTION: &str = "Jurisdiction of Occurrence";
pub const RAW_WEEK_ENDING_DATE: &str = "Week Ending Date";

/// BEA population columns
pub const GEO_NAME: &str = "GeoName";
pub const GEO_FIPS: &str = "GeoFips";

/// The 13 tracked causes of death, in report order
pub const CAUSE_COLUMNS: [&str; 13] = [
    "Septicemia",
    "Malignant Neoplasms",
    "Diabetes",
    "Alzheimer",
    "Influenza and Pneumonia",
    "Chronic Respiratory Diseases",
    "Other Respiratory Diseases",
    "Nephritis",
    "Abnormal Findings",
    "Heart Diseases",
    "Cerebrovascular Diseases",
    "COVID-19 (Multiple Cause)",
    "COVID-19 (Underlying Cause)",
];

/// Data-quality flag columns dropped by the cleaner
pub const FLAG_COLUMNS: [&str; 15] = [
    "flag_allcause",
    "flag_natcause",
    "flag_sept",
    "flag_neopl",
    "flag_diab",
    "flag_alz",
    "flag_inflpn",
    "flag_clrd",
    "flag_otherresp",
    "flag_nephr",
    "flag_otherunk",
    "flag_hd",
    "flag_stroke",
    "flag_cov19mcod",
    "flag_cov19ucod",
];

/// Raw CDC header → short name
pub const RENAMES: [(&str, &str); 20] = [
    ("Data As Of", "Date"),
    (RAW_JURISDICTION, JURISDICTION),
    ("MMWR Year", YEAR),
    ("MMWR Week", "Week"),
    (RAW_WEEK_ENDING_DATE, "Ending Date"),
    ("All Cause", TOTAL_DEATHS),
    ("Natural Cause", NATURAL_DEATHS),
    ("Septicemia (A40-A41)", "Septicemia"),
    ("Malignant neoplasms (C00-C97)", "Malignant Neoplasms"),
    ("Diabetes mellitus (E10-E14)", "Diabetes"),
    ("Alzheimer disease (G30)", "Alzheimer"),
    ("Influenza and pneumonia (J09-J18)", "Influenza and Pneumonia"),
    ("Chronic lower respiratory diseases (J40-J47)", "Chronic Respiratory Diseases"),
    (
        "Other diseases of respiratory system (J00-J06,J30-J39,J67,J70-J98)",
        "Other Respiratory Diseases",
    ),
    (
        "Nephritis, nephrotic syndrome and nephrosis (N00-N07,N17-N19,N25-N27)",
        "Nephritis",
    ),
    (
        "Symptoms, signs and abnormal clinical and laboratory findings, not elsewhere classified (R00-R99)",
        "Abnormal Findings",
    ),
    ("Diseases of heart (I00-I09,I11,I13,I20-I51)", "Heart Diseases"),
    ("Cerebrovascular diseases (I60-I69)", "Cerebrovascular Diseases"),
    ("COVID-19 (U071, Multiple Cause of Death)", "COVID-19 (Multiple Cause)"),
    ("COVID-19 (U071, Underlying Cause of Death)", "COVID-19 (Underlying Cause)"),
];

/// MortalityRecord columns produced by the cleaner
pub fn mortality_columns() -> Vec<&'static str> {
    let mut cols = vec![JURISDICTION, YEAR, QUARTER, TOTAL_DEATHS, NATURAL_DEATHS];
    cols.extend(CAUSE_COLUMNS);
    cols
}

/// MergedRecord columns produced by the merger
pub fn merged_columns() -> Vec<&'static str> {
    let mut cols = vec![
        JURISDICTION,
        YEAR,
        QUARTER,
        TOTAL_POPULATION,
        TOTAL_DEATHS,
        NATURAL_DEATHS,
    ];
    cols.extend(CAUSE_COLUMNS);
    cols
}

/// Fail with a schema error naming the first required column not in `df`
pub fn require_columns(df: &DataFrame, required: &[&str], stage: Stage) -> Result<()> {
    let present: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    match required.iter().find(|col| !present.iter().any(|p| p == *col)) {
        Some(missing) => Err(PipelineError::missing_column(stage, missing)),
        None => Ok(()),
    }
}

/// Read a column as owned string values, casting non-string dtypes
pub fn string_values(df: &DataFrame, name: &str, stage: Stage) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(stage, name))?;
    let cast = column
        .cast(&DataType::String)
        .map_err(|e| PipelineError::malformed_column(stage, name, format!("is not text: {}", e)))?;
    let ca = cast
        .str()
        .map_err(|e| PipelineError::malformed_column(stage, name, format!("is not text: {}", e)))?;
    Ok(ca.into_iter().map(|v| v.map(|s| s.to_string())).collect())
}

/// Read a numeric column as f64 values
pub fn float_values(df: &DataFrame, name: &str, stage: Stage) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(stage, name))?;
    if !column.dtype().is_primitive_numeric() && column.dtype() != &DataType::Null {
        return Err(PipelineError::malformed_column(
            stage,
            name,
            format!("is not numeric ({})", column.dtype()),
        ));
    }
    let cast = column
        .cast(&DataType::Float64)
        .map_err(|e| PipelineError::malformed_column(stage, name, e.to_string()))?;
    let ca = cast
        .f64()
        .map_err(|e| PipelineError::malformed_column(stage, name, e.to_string()))?;
    Ok(ca.into_iter().collect())
}
