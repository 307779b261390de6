//! Train/test split, tree fitting and scoring
//!
//! [`Modeler`] moves through Unloaded → Loaded → Split → Fitted → Evaluated.
//! Each phase checks that the previous one has run and fails with a state
//! error otherwise. Re-running an earlier phase discards everything after it.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use super::error::{PipelineError, Result, Stage};
use super::schema::float_values;
use super::tree::{RegressionTree, TreeParams};

/// Parameters of the train/test split
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitParams {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Row indices of each partition, ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// Shuffle `0..n_rows` with a seeded RNG; the first ceil(n·fraction) are test.
    pub fn new(n_rows: usize, params: &SplitParams) -> Result<Self> {
        let fraction = params.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(PipelineError::config(
                Stage::Model,
                format!("test fraction must lie in (0, 1), got {}", fraction),
            ));
        }

        let mut indices: Vec<usize> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);
        indices.shuffle(&mut rng);

        let n_test = ((n_rows as f64) * fraction).ceil() as usize;
        let mut train = indices.split_off(n_test.min(n_rows));
        let mut test = indices;
        train.sort_unstable();
        test.sort_unstable();
        Ok(Self { train, test })
    }
}

/// Test-set scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub mae: f64,
    pub mse: f64,
    pub r2: f64,
}

impl Metrics {
    /// Score predictions against actual values; both must have the same
    /// non-zero length.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;

        let (abs_sum, ss_res) = actual
            .iter()
            .zip(predicted)
            .fold((0.0, 0.0), |(a, s), (y, p)| (a + (y - p).abs(), s + (y - p).powi(2)));
        let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();

        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        Self {
            mae: abs_sum / n,
            mse: ss_res / n,
            r2,
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct ModelArtifact {
    pub target: String,
    pub feature_names: Vec<String>,
    pub split_params: SplitParams,
    pub tree_params: TreeParams,
    pub split: TrainTestSplit,
    pub tree: RegressionTree,
    pub metrics: Metrics,
}

impl ModelArtifact {
    /// (feature, importance) pairs, most important first
    pub fn ranked_importances(&self) -> Vec<(&str, f64)> {
        let mut pairs: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .map(String::as_str)
            .zip(self.tree.feature_importances().iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }
}

/// Feature matrix and target pulled out of a prepared table
#[derive(Debug, Clone)]
struct Dataset {
    target: String,
    feature_names: Vec<String>,
    /// Column-major: `columns[j][i]` is feature j of row i
    columns: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl Dataset {
    fn gather(&self, rows: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let columns = self
            .columns
            .iter()
            .map(|c| rows.iter().map(|&r| c[r]).collect())
            .collect();
        let targets = rows.iter().map(|&r| self.targets[r]).collect();
        (columns, targets)
    }

    fn row(&self, r: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[r]).collect()
    }
}

/// Which phase the modeler has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Phase {
    Unloaded,
    Loaded,
    Split,
    Fitted,
    Evaluated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Unloaded => "unloaded",
            Phase::Loaded => "loaded",
            Phase::Split => "split",
            Phase::Fitted => "fitted",
            Phase::Evaluated => "evaluated",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Default)]
pub struct Modeler {
    data: Option<Dataset>,
    split_params: Option<SplitParams>,
    split: Option<TrainTestSplit>,
    tree_params: Option<TreeParams>,
    tree: Option<RegressionTree>,
    metrics: Option<Metrics>,
}

fn values_of(table: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = float_values(table, name, Stage::Model).map_err(|err| match err {
        PipelineError::Schema { .. } => PipelineError::data(
            Stage::Model,
            format!("column '{}' is not numeric", name),
        ),
        other => other,
    })?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.filter(|x| x.is_finite()).ok_or_else(|| {
                PipelineError::data(
                    Stage::Model,
                    format!("column '{}' has a missing or non-finite value at row {}", name, row),
                )
            })
        })
        .collect()
}

impl Modeler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.metrics.is_some() {
            Phase::Evaluated
        } else if self.tree.is_some() {
            Phase::Fitted
        } else if self.split.is_some() {
            Phase::Split
        } else if self.data.is_some() {
            Phase::Loaded
        } else {
            Phase::Unloaded
        }
    }

    fn require(&self, needed: Phase, action: &str) -> Result<()> {
        let phase = self.phase();
        if phase < needed {
            return Err(PipelineError::state(
                Stage::Model,
                format!("cannot {} while {}; the model must be {} first", action, phase, needed),
            ));
        }
        Ok(())
    }

    /// Take `target` as the response and every other column as a predictor.
    pub fn load(&mut self, table: &DataFrame, target: &str) -> Result<&mut Self> {
        if table.column(target).is_err() {
            return Err(PipelineError::config(
                Stage::Model,
                format!("target column '{}' not found", target),
            ));
        }

        let feature_names: Vec<String> = table
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| n != target)
            .collect();
        let columns = feature_names
            .iter()
            .map(|name| values_of(table, name))
            .collect::<Result<Vec<_>>>()?;
        let targets = values_of(table, target)?;

        tracing::info!(rows = targets.len(), features = columns.len(), target, "loaded model inputs");

        *self = Self {
            data: Some(Dataset {
                target: target.to_string(),
                feature_names,
                columns,
                targets,
            }),
            ..Self::default()
        };
        Ok(self)
    }

    pub fn split(&mut self, test_fraction: f64, seed: u64) -> Result<&mut Self> {
        self.require(Phase::Loaded, "split")?;
        let params = SplitParams { test_fraction, seed };
        let n_rows = self.data.as_ref().map_or(0, |d| d.targets.len());
        let split = TrainTestSplit::new(n_rows, &params)?;

        tracing::info!(train = split.train.len(), test = split.test.len(), seed, "split rows");

        self.split_params = Some(params);
        self.split = Some(split);
        self.tree_params = None;
        self.tree = None;
        self.metrics = None;
        Ok(self)
    }

    pub fn fit(&mut self, params: &TreeParams) -> Result<&mut Self> {
        self.require(Phase::Split, "fit")?;
        let (Some(data), Some(split)) = (&self.data, &self.split) else {
            return Err(PipelineError::state(Stage::Model, "cannot fit before split"));
        };
        if split.train.is_empty() {
            return Err(PipelineError::data(Stage::Model, "training partition is empty"));
        }

        let (columns, targets) = data.gather(&split.train);
        let tree = RegressionTree::fit(&columns, &targets, params)?;
        tracing::info!(depth = tree.depth(), leaves = tree.n_leaves(), "fitted model");

        self.tree_params = Some(params.clone());
        self.tree = Some(tree);
        self.metrics = None;
        Ok(self)
    }

    pub fn evaluate(&mut self) -> Result<Metrics> {
        self.require(Phase::Fitted, "evaluate")?;
        let (Some(data), Some(split), Some(tree)) = (&self.data, &self.split, &self.tree) else {
            return Err(PipelineError::state(Stage::Model, "cannot evaluate before fit"));
        };
        if split.test.is_empty() {
            return Err(PipelineError::data(Stage::Model, "test partition is empty"));
        }

        let actual: Vec<f64> = split.test.iter().map(|&r| data.targets[r]).collect();
        let predicted: Vec<f64> = split.test.iter().map(|&r| tree.predict(&data.row(r))).collect();
        let metrics = Metrics::compute(&actual, &predicted);

        tracing::info!(mae = metrics.mae, mse = metrics.mse, r2 = metrics.r2, "evaluated model");
        self.metrics = Some(metrics);
        Ok(metrics)
    }

    pub fn metrics(&self) -> Option<Metrics> {
        self.metrics
    }

    pub fn tree(&self) -> Option<&RegressionTree> {
        self.tree.as_ref()
    }

    pub fn feature_names(&self) -> &[String] {
        self.data
            .as_ref()
            .map(|d| d.feature_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn train_test_split(&self) -> Option<&TrainTestSplit> {
        self.split.as_ref()
    }

    /// Hand over the evaluated model
    pub fn into_artifact(self) -> Result<ModelArtifact> {
        self.require(Phase::Evaluated, "build the artifact")?;
        match self {
            Modeler {
                data: Some(data),
                split_params: Some(split_params),
                split: Some(split),
                tree_params: Some(tree_params),
                tree: Some(tree),
                metrics: Some(metrics),
            } => Ok(ModelArtifact {
                target: data.target,
                feature_names: data.feature_names,
                split_params,
                tree_params,
                split,
                tree,
                metrics,
            }),
            _ => Err(PipelineError::state(Stage::Model, "model is not evaluated")),
        }
    }
}
