//! Correlation matrix and target-correlation feature selection

use faer::Mat;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

use super::error::{AtStage, PipelineError, Result, Stage};
use super::schema::CAUSE_COLUMNS;

/// Default number of predictors kept by feature selection
pub const DEFAULT_TOP_K: usize = 9;

/// Pearson correlation matrix over the numeric columns of a table.
///
/// Constant and all-missing columns have NaN in their row and column.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    names: Vec<String>,
    values: Mat<f64>,
}

impl CorrelationMatrix {
    /// Build from precomputed row-major values; None if the shape is not square
    pub fn from_values(names: Vec<String>, rows: &[Vec<f64>]) -> Option<Self> {
        let n = names.len();
        if rows.len() != n || rows.iter().any(|r| r.len() != n) {
            return None;
        }
        let values = Mat::from_fn(n, n, |i, j| rows[i][j]);
        Some(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[(self.index_of(a)?, self.index_of(b)?)])
    }

    /// Correlations of every other column with `name`, in column order
    pub fn column(&self, name: &str) -> Option<Vec<(String, f64)>> {
        let j = self.index_of(name)?;
        Some(
            self.names
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != j)
                .map(|(i, n)| (n.clone(), self.values[(i, j)]))
                .collect(),
        )
    }
}

/// Standardize a column so that `z_a · z_b` is the Pearson correlation.
///
/// Only exact for columns without missing values; missing values contribute
/// 0. Returns None for constant or all-missing columns.
fn standardize(col: &Column) -> Option<Vec<f64>> {
    let ca = col.f64().ok()?;

    let (sum, count) = ca
        .into_iter()
        .flatten()
        .fold((0.0f64, 0usize), |(s, n), x| (s + x, n + 1));
    if count == 0 {
        return None;
    }
    let n = count as f64;
    let mean = sum / n;

    let sum_sq_dev: f64 = ca.into_iter().flatten().map(|x| (x - mean) * (x - mean)).sum();
    // Population standard deviation
    let std = (sum_sq_dev / n).sqrt();
    if std == 0.0 || !std.is_finite() {
        return None;
    }

    let scale = 1.0 / (n.sqrt() * std);
    Some(
        ca.into_iter()
            .map(|v| v.map(|x| (x - mean) * scale).unwrap_or(0.0))
            .collect(),
    )
}

/// Pearson correlation over the rows where both values are present.
///
/// Single-pass Welford update. None when fewer than two rows overlap or either
/// side is constant over the overlap.
fn pairwise_complete_pearson(a: &Column, b: &Column) -> Option<f64> {
    let ca_a = a.f64().ok()?;
    let ca_b = b.f64().ok()?;
    if ca_a.len() != ca_b.len() {
        return None;
    }

    let mut n = 0.0;
    let mut mean_x = 0.0;
    let mut mean_y = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut cov_xy = 0.0;

    for (x, y) in ca_a.iter().zip(ca_b.iter()) {
        if let (Some(x), Some(y)) = (x, y) {
            n += 1.0;
            let dx = x - mean_x;
            let dy = y - mean_y;
            mean_x += dx / n;
            mean_y += dy / n;
            var_x += dx * (x - mean_x);
            var_y += dy * (y - mean_y);
            cov_xy += dx * (y - mean_y);
        }
    }

    if n < 2.0 || var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some(cov_xy / (var_x.sqrt() * var_y.sqrt()))
}

/// Compute the correlation matrix using matrix operations.
///
/// Algorithm:
/// 1. Standardize each numeric column: Z = (X - mean) / (std * sqrt(n))
/// 2. Compute correlation matrix: R = Z^T * Z
/// 3. Recompute every pair that involves a column with missing values over
///    the rows where both are present
pub fn correlation_matrix(df: &DataFrame) -> Result<CorrelationMatrix> {
    let float_columns: Vec<(String, Column)> = df
        .get_columns()
        .iter()
        .filter(|col| col.dtype().is_primitive_numeric())
        .map(|col| {
            col.cast(&DataType::Float64)
                .map(|cast| (col.name().to_string(), cast))
                .at(Stage::Prepare)
        })
        .collect::<Result<Vec<_>>>()?;

    let names: Vec<String> = float_columns.iter().map(|(n, _)| n.clone()).collect();
    let n_cols = names.len();
    let n_rows = df.height();

    let standardized: Vec<Option<Vec<f64>>> = float_columns
        .par_iter()
        .map(|(_, col)| standardize(col))
        .collect();

    let mut z = Mat::<f64>::zeros(n_rows, n_cols);
    for (col_idx, col_data) in standardized.iter().enumerate() {
        if let Some(values) = col_data {
            for (row_idx, &val) in values.iter().enumerate() {
                z[(row_idx, col_idx)] = val;
            }
        }
    }

    let mut values = z.transpose() * &z;

    let has_nulls: Vec<bool> = float_columns.iter().map(|(_, col)| col.null_count() > 0).collect();
    let pairs: Vec<(usize, usize)> = (0..n_cols)
        .flat_map(|i| ((i + 1)..n_cols).map(move |j| (i, j)))
        .filter(|&(i, j)| has_nulls[i] || has_nulls[j])
        .filter(|&(i, j)| standardized[i].is_some() && standardized[j].is_some())
        .collect();
    let pairwise: Vec<(usize, usize, f64)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let r = pairwise_complete_pearson(&float_columns[i].1, &float_columns[j].1)
                .unwrap_or(f64::NAN);
            (i, j, r)
        })
        .collect();
    for (i, j, r) in pairwise {
        values[(i, j)] = r;
        values[(j, i)] = r;
    }
    if !pairs.is_empty() {
        tracing::debug!(pairs = pairs.len(), "pairwise-complete correlations for columns with missing values");
    }

    for i in 0..n_cols {
        for j in 0..n_cols {
            values[(i, j)] = if standardized[i].is_none() || standardized[j].is_none() {
                f64::NAN
            } else if i == j {
                1.0
            } else if values[(i, j)].is_nan() {
                f64::NAN
            } else {
                values[(i, j)].clamp(-1.0, 1.0)
            };
        }
    }

    Ok(CorrelationMatrix { names, values })
}

/// A candidate predictor and its correlation with the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFeature {
    pub feature: String,
    pub correlation: f64,
}

/// Descending |r| with NaN last; equal keys keep their input order
fn by_abs_correlation_desc(a: &RankedFeature, b: &RankedFeature) -> Ordering {
    match (a.correlation.is_nan(), b.correlation.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b
            .correlation
            .abs()
            .partial_cmp(&a.correlation.abs())
            .unwrap_or(Ordering::Equal),
    }
}

/// Rank every column except the target by absolute correlation with it
pub fn rank_by_target(matrix: &CorrelationMatrix, target: &str) -> Result<Vec<RankedFeature>> {
    let column = matrix.column(target).ok_or_else(|| {
        PipelineError::config(
            Stage::Prepare,
            format!("target column '{}' is not a numeric column", target),
        )
    })?;

    let mut ranking: Vec<RankedFeature> = column
        .into_iter()
        .map(|(feature, correlation)| RankedFeature {
            feature,
            correlation,
        })
        .collect();
    ranking.sort_by(by_abs_correlation_desc);
    Ok(ranking)
}

/// Outcome of top-k selection
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSelection {
    pub target: String,
    pub k: usize,
    /// The k predictors, strongest first
    pub selected: Vec<RankedFeature>,
    /// Every candidate, ranked
    pub ranking: Vec<RankedFeature>,
}

impl FeatureSelection {
    pub fn feature_names(&self) -> Vec<&str> {
        self.selected.iter().map(|f| f.feature.as_str()).collect()
    }
}

/// Keep the `k` predictors most correlated with `target`.
///
/// The output table holds the selected columns in rank order followed by the
/// target, with row order preserved. Fails if the target is absent or if `k`
/// is zero or exceeds the number of numeric non-target columns.
pub fn select_top_k_features(
    df: &DataFrame,
    target: &str,
    k: usize,
) -> Result<(DataFrame, FeatureSelection)> {
    if df.column(target).is_err() {
        return Err(PipelineError::config(
            Stage::Prepare,
            format!("target column '{}' not found", target),
        ));
    }
    if k == 0 {
        return Err(PipelineError::config(Stage::Prepare, "k must be at least 1"));
    }

    let matrix = correlation_matrix(df)?;
    let ranking = rank_by_target(&matrix, target)?;

    if k > ranking.len() {
        return Err(PipelineError::config(
            Stage::Prepare,
            format!(
                "k = {} exceeds the {} available numeric feature column(s)",
                k,
                ranking.len()
            ),
        ));
    }

    let selected: Vec<RankedFeature> = ranking.iter().take(k).cloned().collect();
    let mut columns: Vec<&str> = selected.iter().map(|f| f.feature.as_str()).collect();
    columns.push(target);
    let table = df.select(columns).at(Stage::Prepare)?;

    tracing::info!(
        k,
        selected = ?selected.iter().map(|f| f.feature.as_str()).collect::<Vec<_>>(),
        "selected features by target correlation"
    );

    Ok((
        table,
        FeatureSelection {
            target: target.to_string(),
            k,
            selected,
            ranking,
        },
    ))
}

/// Correlation of each tracked cause of death with the target, in cause order
pub fn cause_correlations(df: &DataFrame, target: &str) -> Result<Vec<RankedFeature>> {
    let mut columns: Vec<&str> = CAUSE_COLUMNS
        .iter()
        .copied()
        .filter(|c| df.column(c).is_ok())
        .collect();
    columns.push(target);

    let subset = df.select(columns).at(Stage::Prepare)?;
    let matrix = correlation_matrix(&subset)?;
    let column = matrix.column(target).ok_or_else(|| {
        PipelineError::config(
            Stage::Prepare,
            format!("target column '{}' is not a numeric column", target),
        )
    })?;

    Ok(column
        .into_iter()
        .map(|(feature, correlation)| RankedFeature {
            feature,
            correlation,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_perfect_and_negative() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0, 4.0, 5.0],
            "b" => [2.0f64, 4.0, 6.0, 8.0, 10.0],
            "c" => [5.0f64, 4.0, 3.0, 2.0, 1.0],
            "label" => ["x", "y", "x", "y", "x"],
        }
        .unwrap();

        let m = correlation_matrix(&df).unwrap();
        assert_eq!(m.names(), &["a", "b", "c"]);
        assert!((m.get("a", "b").unwrap() - 1.0).abs() < 1e-9);
        assert!((m.get("a", "c").unwrap() + 1.0).abs() < 1e-9);
        assert_eq!(m.get("a", "label"), None);
    }

    #[test]
    fn test_constant_column_is_nan() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0],
            "flat" => [7.0f64, 7.0, 7.0],
        }
        .unwrap();

        let m = correlation_matrix(&df).unwrap();
        assert!(m.get("a", "flat").unwrap().is_nan());
        assert!(m.get("flat", "flat").unwrap().is_nan());
        assert_eq!(m.get("a", "a"), Some(1.0));
    }

    #[test]
    fn test_ranking_puts_nan_last_and_is_stable() {
        let mut ranking = vec![
            RankedFeature { feature: "nan".into(), correlation: f64::NAN },
            RankedFeature { feature: "first".into(), correlation: 0.5 },
            RankedFeature { feature: "neg".into(), correlation: -0.9 },
            RankedFeature { feature: "second".into(), correlation: -0.5 },
        ];
        ranking.sort_by(by_abs_correlation_desc);
        let order: Vec<&str> = ranking.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(order, vec!["neg", "first", "second", "nan"]);
    }

    #[test]
    fn test_missing_values_use_pairwise_complete_rows() {
        // Linear wherever Diabetes is present; the last row is only on one side
        let df = df! {
            "Diabetes" => [Some(1.0f64), Some(2.0), Some(3.0), Some(4.0), None],
            "Total Deaths" => [2.0f64, 4.0, 6.0, 8.0, 100.0],
            "Heart Diseases" => [4.0f64, 3.0, 2.0, 1.0, -90.0],
        }
        .unwrap();

        let m = correlation_matrix(&df).unwrap();
        assert!((m.get("Diabetes", "Total Deaths").unwrap() - 1.0).abs() < 1e-12);
        assert!((m.get("Total Deaths", "Diabetes").unwrap() - 1.0).abs() < 1e-12);
        assert!((m.get("Diabetes", "Heart Diseases").unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(m.get("Diabetes", "Diabetes"), Some(1.0));

        let causes = cause_correlations(&df, "Total Deaths").unwrap();
        let diabetes = causes.iter().find(|c| c.feature == "Diabetes").unwrap();
        assert!((diabetes.correlation - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pairwise_overlap_too_small_is_nan() {
        let df = df! {
            "a" => [Some(1.0f64), None, None, Some(4.0)],
            "b" => [None, Some(2.0f64), Some(5.0), Some(1.0)],
        }
        .unwrap();

        let m = correlation_matrix(&df).unwrap();
        assert!(m.get("a", "b").unwrap().is_nan());
    }

    #[test]
    fn test_pairwise_matches_matrix_path_without_nulls() {
        let x = [3.0f64, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let y = [2.0f64, 7.0, 1.0, 8.0, 2.0, 8.0, 1.0, 8.0];
        let df = df! { "x" => x, "y" => y }.unwrap();

        let matrix_r = correlation_matrix(&df).unwrap().get("x", "y").unwrap();
        let pairwise_r =
            pairwise_complete_pearson(df.column("x").unwrap(), df.column("y").unwrap()).unwrap();
        assert!((matrix_r - pairwise_r).abs() < 1e-12);
    }
}
