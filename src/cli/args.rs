//! Command-line argument definitions using clap

use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::loader::{DEFAULT_MORTALITY_SOURCE, DEFAULT_POPULATION_SOURCE};
use crate::pipeline::model::SplitParams;
use crate::pipeline::outliers::OutlierMethod;
use crate::pipeline::prepare::PrepareConfig;
use crate::pipeline::schema::TOTAL_DEATHS;
use crate::pipeline::tree::{MaxFeatures, TreeParams};

/// Merge mortality and population data, select the causes most correlated
/// with the target and fit a regression tree on them
#[derive(Parser, Debug)]
#[command(name = "mortality")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Mortality-by-cause source: a CSV/Parquet path or an http(s) URL
    #[arg(long, default_value = DEFAULT_MORTALITY_SOURCE)]
    pub mortality: String,

    /// Quarterly population source: a CSV/Parquet path or an http(s) URL
    #[arg(long, default_value = DEFAULT_POPULATION_SOURCE)]
    pub population: String,

    /// Column the model predicts
    #[arg(short, long, default_value = TOTAL_DEATHS)]
    pub target: String,

    /// Number of predictors kept by correlation ranking
    #[arg(short = 'k', long, default_value = "9", value_parser = validate_positive)]
    pub top_k: usize,

    /// Share of rows held out for evaluation, strictly between 0 and 1
    #[arg(long, default_value = "0.2", value_parser = validate_test_size)]
    pub test_size: f64,

    /// Seed for the train/test shuffle and the tree's feature sampling
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum depth of the regression tree
    #[arg(long, default_value = "5")]
    pub max_depth: usize,

    /// Minimum samples a node needs before it may split
    #[arg(long, default_value = "20", value_parser = validate_positive)]
    pub min_samples_split: usize,

    /// Minimum samples in every leaf
    #[arg(long, default_value = "10", value_parser = validate_positive)]
    pub min_samples_leaf: usize,

    /// Drop outlier rows before feature preparation.
    /// Options: "iqr" or "z-score". Off by default.
    #[arg(long, value_parser = validate_outlier_method)]
    pub outliers: Option<OutlierMethod>,

    /// Depth at which the printed tree is cut off
    #[arg(long, default_value = "3")]
    pub tree_depth: usize,

    /// Number of regions listed in the death-rate ranking
    #[arg(long, default_value = "10")]
    pub top_regions: usize,

    /// Write the merged table, with derived rate columns, to this path
    /// (CSV or Parquet, determined by extension)
    #[arg(long)]
    pub merged_output: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan.
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,

    /// Show debug logs on stderr
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

impl Cli {
    pub fn prepare_config(&self) -> PrepareConfig {
        PrepareConfig { top_k: self.top_k }
    }

    pub fn split_params(&self) -> SplitParams {
        SplitParams {
            test_fraction: self.test_size,
            seed: self.seed,
        }
    }

    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: MaxFeatures::Sqrt,
            seed: self.seed,
        }
    }
}

/// Validator for test_size parameter
fn validate_test_size(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!(
            "test_size must be strictly between 0.0 and 1.0, got {}",
            value
        ))
    }
}

/// Validator for counts that must be at least 1
fn validate_positive(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid non-negative integer", s))?;

    if value == 0 {
        Err("value must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

fn validate_outlier_method(s: &str) -> Result<OutlierMethod, String> {
    s.parse().map_err(|e: crate::pipeline::PipelineError| e.to_string())
}
