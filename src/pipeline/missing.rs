//! Missing value analysis and imputation

use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

use super::error::{AtStage, Result, Stage};

/// Analyze missing values in the dataset.
///
/// Returns `(column, null_count / row_count)` sorted by missing ratio descending.
pub fn analyze_missing_values(df: &DataFrame) -> Result<Vec<(String, f64)>> {
    // Handle empty DataFrame
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let total = df.height() as f64;
    let mut missing_ratios: Vec<(String, f64)> = df
        .get_columns()
        .iter()
        .map(|col| (col.name().to_string(), col.null_count() as f64 / total))
        .collect();

    // Sort by missing ratio descending
    missing_ratios.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(missing_ratios)
}

/// Value written into the missing cells of one column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FillValue {
    Mean(f64),
    MostFrequent(String),
}

/// Record of one imputed column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputedColumn {
    pub column: String,
    pub fill: FillValue,
    /// Number of cells that were filled
    pub filled: usize,
}

/// What the imputation step changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputationReport {
    pub imputed: Vec<ImputedColumn>,
    /// Columns with no present values, left untouched
    pub skipped_all_missing: Vec<String>,
}

enum ColumnOutcome {
    Unchanged,
    AllMissing,
    Imputed(Column, ImputedColumn),
}

fn is_text(col: &Column) -> bool {
    col.dtype() == &DataType::String
}

fn impute_numeric(col: &Column) -> Result<ColumnOutcome> {
    let cast = col.cast(&DataType::Float64).at(Stage::Prepare)?;
    let ca = cast.f64().at(Stage::Prepare)?;

    let (sum, count) = ca
        .into_iter()
        .flatten()
        .fold((0.0f64, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        return Ok(ColumnOutcome::AllMissing);
    }
    let mean = sum / count as f64;

    let values: Vec<f64> = ca.into_iter().map(|v| v.unwrap_or(mean)).collect();
    Ok(ColumnOutcome::Imputed(
        Column::new(col.name().clone(), values),
        ImputedColumn {
            column: col.name().to_string(),
            fill: FillValue::Mean(mean),
            filled: col.null_count(),
        },
    ))
}

/// Most frequent value; ties resolve to the lexicographically smallest
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(v, _)| v)
}

fn impute_text(col: &Column) -> Result<ColumnOutcome> {
    let ca = col.str().at(Stage::Prepare)?;
    let Some(mode) = most_frequent(ca.into_iter().flatten()).map(str::to_string) else {
        return Ok(ColumnOutcome::AllMissing);
    };

    let values: Vec<String> = ca
        .into_iter()
        .map(|v| v.unwrap_or(mode.as_str()).to_string())
        .collect();
    Ok(ColumnOutcome::Imputed(
        Column::new(col.name().clone(), values),
        ImputedColumn {
            column: col.name().to_string(),
            fill: FillValue::MostFrequent(mode),
            filled: col.null_count(),
        },
    ))
}

fn impute_column(col: &Column) -> Result<ColumnOutcome> {
    if col.null_count() == 0 {
        return Ok(ColumnOutcome::Unchanged);
    }
    if col.dtype() == &DataType::Null {
        return Ok(ColumnOutcome::AllMissing);
    }
    if col.dtype().is_primitive_numeric() {
        impute_numeric(col)
    } else if is_text(col) {
        impute_text(col)
    } else {
        Ok(ColumnOutcome::Unchanged)
    }
}

/// Fill missing values: column mean for numeric columns, most frequent value
/// for text columns.
///
/// Numeric columns that had missing values become Float64. Columns with no
/// present values are skipped and listed in the report. Running this on its
/// own output changes nothing.
pub fn impute_missing(df: &DataFrame) -> Result<(DataFrame, ImputationReport)> {
    let outcomes: Vec<ColumnOutcome> = df
        .get_columns()
        .par_iter()
        .map(impute_column)
        .collect::<Result<Vec<_>>>()?;

    let mut report = ImputationReport::default();
    let mut columns: Vec<Column> = Vec::with_capacity(df.width());

    for (original, outcome) in df.get_columns().iter().zip(outcomes) {
        match outcome {
            ColumnOutcome::Unchanged => columns.push(original.clone()),
            ColumnOutcome::AllMissing => {
                tracing::debug!(column = %original.name(), "entirely missing, imputation skipped");
                report.skipped_all_missing.push(original.name().to_string());
                columns.push(original.clone());
            }
            ColumnOutcome::Imputed(column, record) => {
                tracing::debug!(column = %record.column, filled = record.filled, "imputed");
                report.imputed.push(record);
                columns.push(column);
            }
        }
    }

    let imputed = DataFrame::new(columns).at(Stage::Prepare)?;
    tracing::info!(
        imputed = report.imputed.len(),
        skipped = report.skipped_all_missing.len(),
        "missing value handling complete"
    );

    Ok((imputed, report))
}
