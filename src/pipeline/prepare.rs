//! Feature preparation: imputation, categorical encoding, top-k selection

use polars::prelude::*;
use serde::Serialize;

use super::correlation::{select_top_k_features, FeatureSelection, DEFAULT_TOP_K};
use super::encoding::{encode_categorical, CategoryMappings};
use super::error::{PipelineError, Result, Stage};
use super::missing::{impute_missing, ImputationReport};

/// Parameters of the preparation stage
#[derive(Debug, Clone, Serialize)]
pub struct PrepareConfig {
    /// Number of predictors kept
    pub top_k: usize,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Everything the preparation stage learned about the table
#[derive(Debug, Clone, Serialize)]
pub struct PreparationReport {
    pub input_rows: usize,
    pub input_columns: usize,
    pub imputation: ImputationReport,
    pub mappings: CategoryMappings,
    pub selection: FeatureSelection,
}

/// Prepare a merged table for modeling.
///
/// Runs missing value handling, then categorical encoding, then top-k feature
/// selection against `target`. The returned table holds the selected
/// predictors followed by the target.
pub fn prepare(
    table: &DataFrame,
    target: &str,
    config: &PrepareConfig,
) -> Result<(DataFrame, PreparationReport)> {
    if table.column(target).is_err() {
        return Err(PipelineError::config(
            Stage::Prepare,
            format!("target column '{}' not found", target),
        ));
    }

    tracing::info!(
        rows = table.height(),
        cols = table.width(),
        target,
        "preparing features"
    );

    let (imputed, imputation) = impute_missing(table)?;
    let (encoded, mappings) = encode_categorical(&imputed)?;
    let (features, selection) = select_top_k_features(&encoded, target, config.top_k)?;

    let report = PreparationReport {
        input_rows: table.height(),
        input_columns: table.width(),
        imputation,
        mappings,
        selection,
    };

    Ok((features, report))
}
