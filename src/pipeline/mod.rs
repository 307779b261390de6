//! Pipeline module - the analysis stages, in run order
//!
//! Loader → Cleaner → Merger → (optional outlier filter) → Feature Preparer → Modeler.
//! Every stage takes a table by reference and returns a new one.

pub mod cleaner;
pub mod correlation;
pub mod encoding;
pub mod error;
pub mod loader;
pub mod merger;
pub mod missing;
pub mod model;
pub mod outliers;
pub mod prepare;
pub mod rates;
pub mod schema;
pub mod tree;

pub use cleaner::clean_mortality;
pub use correlation::{
    cause_correlations, correlation_matrix, rank_by_target, select_top_k_features,
    CorrelationMatrix, FeatureSelection, RankedFeature,
};
pub use encoding::{encode_categorical, CategoryMapping, CategoryMappings};
pub use error::{ErrorKind, PipelineError, Result, Stage};
pub use loader::{dataset_stats, load_table, save_dataset};
pub use merger::{merge, reshape_population, MergeOutcome, RegionDiff};
pub use missing::{analyze_missing_values, impute_missing, ImputationReport};
pub use model::{Metrics, ModelArtifact, Modeler, SplitParams, TrainTestSplit};
pub use outliers::{filter_outliers, OutlierMethod, OutlierReport};
pub use prepare::{prepare, PrepareConfig, PreparationReport};
pub use rates::{quarterly_rate_trends, top_regions_by_death_rate, with_cause_rates, with_death_rate};
pub use tree::{MaxFeatures, RegressionTree, TreeParams};
