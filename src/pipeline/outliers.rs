//! Optional outlier filtering
//!
//! Not part of the default pipeline; callers opt in with an explicit method.

use polars::prelude::*;
use serde::Serialize;

use super::error::{AtStage, PipelineError, Result, Stage};
use super::schema::float_values;

/// Z-score at or above which a row is dropped
const Z_SCORE_CUTOFF: f64 = 3.0;

/// IQR fence multiplier
const IQR_FENCE: f64 = 1.5;

/// Outlier filtering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutlierMethod {
    /// Drop rows outside [Q1 - 1.5·IQR, Q3 + 1.5·IQR], column by column
    Iqr,
    /// Drop rows where any numeric column has |z| >= 3
    ZScore,
}

impl std::fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutlierMethod::Iqr => write!(f, "iqr"),
            OutlierMethod::ZScore => write!(f, "z-score"),
        }
    }
}

impl std::str::FromStr for OutlierMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr),
            "z-score" | "zscore" => Ok(OutlierMethod::ZScore),
            _ => Err(PipelineError::config(
                Stage::Outliers,
                format!("unknown outlier method '{}'. Use 'iqr' or 'z-score'.", s),
            )),
        }
    }
}

/// Rows removed by an outlier pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub method: OutlierMethod,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Rows each column was responsible for dropping
    pub dropped_by_column: Vec<(String, usize)>,
}

/// Quantile with linear interpolation between closest ranks; `sorted` must be ascending
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|col| col.dtype().is_primitive_numeric())
        .map(|col| col.name().to_string())
        .collect()
}

fn iqr_filter(df: &DataFrame) -> Result<(DataFrame, Vec<(String, usize)>)> {
    let mut current = df.clone();
    let mut dropped = Vec::new();

    // Fences are recomputed on the rows that survived the previous columns
    for name in numeric_column_names(df) {
        let values = float_values(&current, &name, Stage::Outliers)?;
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        present.sort_by(|a, b| a.total_cmp(b));

        let (Some(q1), Some(q3)) = (quantile(&present, 0.25), quantile(&present, 0.75)) else {
            continue;
        };
        let iqr = q3 - q1;
        let (low, high) = (q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr);

        let keep: Vec<bool> = values
            .iter()
            .map(|v| v.map_or(true, |x| x >= low && x <= high))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed > 0 {
            let mask = BooleanChunked::from_slice("keep".into(), &keep);
            current = current.filter(&mask).at(Stage::Outliers)?;
            tracing::debug!(column = %name, removed, low, high, "iqr filter");
        }
        dropped.push((name, removed));
    }

    Ok((current, dropped))
}

fn z_score_filter(df: &DataFrame) -> Result<(DataFrame, Vec<(String, usize)>)> {
    let mut keep = vec![true; df.height()];
    let mut flagged = Vec::new();

    for name in numeric_column_names(df) {
        let values = float_values(df, &name, Stage::Outliers)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            continue;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let std = (present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        // Constant column: every z-score is 0
        if std == 0.0 {
            flagged.push((name, 0));
            continue;
        }

        let mut count = 0;
        for (row, value) in values.iter().enumerate() {
            if let Some(x) = value {
                if ((x - mean) / std).abs() >= Z_SCORE_CUTOFF {
                    keep[row] = false;
                    count += 1;
                }
            }
        }
        flagged.push((name, count));
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let filtered = df.filter(&mask).at(Stage::Outliers)?;
    Ok((filtered, flagged))
}

/// Drop outlier rows with the given method. Missing cells never cause a drop.
pub fn filter_outliers(df: &DataFrame, method: OutlierMethod) -> Result<(DataFrame, OutlierReport)> {
    let (filtered, dropped_by_column) = match method {
        OutlierMethod::Iqr => iqr_filter(df)?,
        OutlierMethod::ZScore => z_score_filter(df)?,
    };

    let report = OutlierReport {
        method,
        rows_before: df.height(),
        rows_after: filtered.height(),
        dropped_by_column,
    };
    tracing::info!(
        method = %method,
        rows_before = report.rows_before,
        rows_after = report.rows_after,
        "outlier filtering complete"
    );

    Ok((filtered, report))
}
