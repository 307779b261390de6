//! JSON run report

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::correlation::RankedFeature;
use crate::pipeline::merger::RegionDiff;
use crate::pipeline::model::{ModelArtifact, SplitParams};
use crate::pipeline::outliers::{OutlierMethod, OutlierReport};
use crate::pipeline::prepare::{PrepareConfig, PreparationReport};
use crate::pipeline::rates::{QuarterTrend, RegionRate};
use crate::pipeline::tree::TreeParams;

/// Metadata about the run
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    pub version: String,
    pub mortality_source: String,
    pub population_source: String,
    pub target_column: String,
    pub prepare: PrepareConfig,
    pub split: SplitParams,
    pub tree: TreeParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierMethod>,
}

impl RunMetadata {
    pub fn now(params: &ReportParams<'_>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mortality_source: params.mortality_source.to_string(),
            population_source: params.population_source.to_string(),
            target_column: params.target_column.to_string(),
            prepare: params.prepare.clone(),
            split: params.split,
            tree: params.tree.clone(),
            outliers: params.outliers,
        }
    }
}

/// Merge stage diagnostics
#[derive(Debug, Serialize)]
pub struct MergeDiagnostics<'a> {
    pub merged_rows: usize,
    pub unmatched_rows: usize,
    pub region_diff: &'a RegionDiff,
}

/// Tree shape and scores next to the fitted model
#[derive(Debug, Serialize)]
pub struct ModelSummary<'a> {
    pub depth: usize,
    pub leaves: usize,
    pub feature_importances: Vec<(&'a str, f64)>,
    #[serde(flatten)]
    pub artifact: &'a ModelArtifact,
}

/// Complete report of one run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub metadata: RunMetadata,
    pub merge: MergeDiagnostics<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outliers: Option<&'a OutlierReport>,
    pub preparation: &'a PreparationReport,
    pub model: ModelSummary<'a>,
    /// Pearson r of each cause with total deaths, on the merged table
    pub cause_correlations: &'a [RankedFeature],
    pub top_regions: &'a [RegionRate],
    pub quarterly_trends: &'a [QuarterTrend],
}

/// Run parameters recorded in the report metadata
pub struct ReportParams<'a> {
    pub mortality_source: &'a str,
    pub population_source: &'a str,
    pub target_column: &'a str,
    pub prepare: &'a PrepareConfig,
    pub split: SplitParams,
    pub tree: &'a TreeParams,
    pub outliers: Option<OutlierMethod>,
}

/// Pieces of a finished run that go into the report
pub struct RunResults<'a> {
    pub merged_rows: usize,
    pub unmatched_rows: usize,
    pub region_diff: &'a RegionDiff,
    pub outliers: Option<&'a OutlierReport>,
    pub preparation: &'a PreparationReport,
    pub artifact: &'a ModelArtifact,
    pub cause_correlations: &'a [RankedFeature],
    pub top_regions: &'a [RegionRate],
    pub quarterly_trends: &'a [QuarterTrend],
}

impl<'a> RunReport<'a> {
    pub fn new(params: &ReportParams<'_>, results: &RunResults<'a>) -> Self {
        Self {
            metadata: RunMetadata::now(params),
            merge: MergeDiagnostics {
                merged_rows: results.merged_rows,
                unmatched_rows: results.unmatched_rows,
                region_diff: results.region_diff,
            },
            outliers: results.outliers,
            preparation: results.preparation,
            model: ModelSummary {
                depth: results.artifact.tree.depth(),
                leaves: results.artifact.tree.n_leaves(),
                feature_importances: results.artifact.ranked_importances(),
                artifact: results.artifact,
            },
            cause_correlations: results.cause_correlations,
            top_regions: results.top_regions,
            quarterly_trends: results.quarterly_trends,
        }
    }
}

/// Export the run report to a JSON file
pub fn export_run_report(report: &RunReport<'_>, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write run report to {}", output_path.display()))?;

    Ok(())
}
