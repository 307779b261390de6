//! CART regression tree
//!
//! Nodes live in a flat arena; a split node stores the arena indices of its
//! children. Splits minimize the summed squared error of the two children,
//! thresholds are midpoints between adjacent distinct values, and a sample
//! goes left when `x <= threshold`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use super::error::{PipelineError, Result, Stage};

/// Values closer than this are treated as equal when searching thresholds
const FEATURE_THRESHOLD: f64 = 1e-7;

/// How many features a node examines before settling on a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaxFeatures {
    /// max(1, floor(sqrt(n_features)))
    Sqrt,
    All,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All => n_features,
            MaxFeatures::Count(n) => n.clamp(1, n_features.max(1)),
        }
    }
}

/// Growth bounds for a regression tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Seeds the per-node feature sampling
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 20,
            min_samples_leaf: 10,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
        samples: usize,
        impurity: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        value: f64,
        samples: usize,
        impurity: f64,
    },
}

impl Node {
    pub fn value(&self) -> f64 {
        match self {
            Node::Leaf { value, .. } | Node::Split { value, .. } => *value,
        }
    }

    pub fn samples(&self) -> usize {
        match self {
            Node::Leaf { samples, .. } | Node::Split { samples, .. } => *samples,
        }
    }

    pub fn impurity(&self) -> f64 {
        match self {
            Node::Leaf { impurity, .. } | Node::Split { impurity, .. } => *impurity,
        }
    }
}

/// Best split found on one feature
struct Candidate {
    feature: usize,
    threshold: f64,
    /// sum_left² / n_left + sum_right² / n_right; larger is better
    proxy: f64,
}

/// Fitted regression tree
#[derive(Debug, Clone, Serialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

struct Builder<'a> {
    columns: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a TreeParams,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> (f64, usize) {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (if n == 0 { 0.0 } else { sum / n as f64 }, n)
}

impl Builder<'_> {
    fn node_stats(&self, rows: &[usize]) -> (f64, f64) {
        let (value, n) = mean(rows.iter().map(|&r| self.targets[r]));
        let impurity = rows
            .iter()
            .map(|&r| (self.targets[r] - value).powi(2))
            .sum::<f64>()
            / n.max(1) as f64;
        (value, impurity)
    }

    /// None when the feature is constant over `rows`; Some(None) when it
    /// varies but no threshold satisfies the leaf bound
    fn split_on_feature(&self, feature: usize, rows: &[usize]) -> Option<Option<Candidate>> {
        let column = &self.columns[feature];
        let mut pairs: Vec<(f64, f64)> = rows.iter().map(|&r| (column[r], self.targets[r])).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        if pairs[n - 1].0 <= pairs[0].0 + FEATURE_THRESHOLD {
            return None;
        }

        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = pairs.iter().map(|(_, y)| y).sum();
        let mut left_sum = 0.0;
        let mut best: Option<Candidate> = None;

        for i in 1..n {
            left_sum += pairs[i - 1].1;
            if pairs[i].0 <= pairs[i - 1].0 + FEATURE_THRESHOLD {
                continue;
            }
            let (n_left, n_right) = (i, n - i);
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let proxy = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            if best.as_ref().map_or(true, |b| proxy > b.proxy) {
                let (lo, hi) = (pairs[i - 1].0, pairs[i].0);
                let mut threshold = lo / 2.0 + hi / 2.0;
                if threshold == hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some(Candidate {
                    feature,
                    threshold,
                    proxy,
                });
            }
        }

        Some(best)
    }

    fn find_split(&mut self, rows: &[usize]) -> Option<Candidate> {
        let mut features: Vec<usize> = (0..self.columns.len()).collect();
        features.shuffle(&mut self.rng);

        let mut visited = 0;
        let mut best: Option<Candidate> = None;
        for feature in features {
            // Past the budget, keep drawing only until some valid split exists
            if visited >= self.max_features && best.is_some() {
                break;
            }
            let Some(candidate) = self.split_on_feature(feature, rows) else {
                continue;
            };
            visited += 1;
            if let Some(c) = candidate {
                if best.as_ref().map_or(true, |b| c.proxy > b.proxy) {
                    best = Some(c);
                }
            }
        }
        best
    }

    fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let (value, impurity) = self.node_stats(&rows);
        let samples = rows.len();
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value,
            samples,
            impurity,
        });

        let params = self.params;
        if depth >= params.max_depth
            || samples < params.min_samples_split
            || samples < 2 * params.min_samples_leaf.max(1)
            || impurity <= f64::EPSILON
        {
            return id;
        }

        let Some(split) = self.find_split(&rows) else {
            return id;
        };

        let column = &self.columns[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| column[r] <= split.threshold);

        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);

        let weighted_child_impurity = |node: &Node| node.samples() as f64 * node.impurity();
        let decrease = samples as f64 * impurity
            - weighted_child_impurity(&self.nodes[left])
            - weighted_child_impurity(&self.nodes[right]);
        self.importances[split.feature] += decrease.max(0.0);

        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            value,
            samples,
            impurity,
        };
        id
    }
}

impl RegressionTree {
    /// Fit on column-major features; `columns[j][i]` is feature j of sample i.
    pub fn fit(columns: &[Vec<f64>], targets: &[f64], params: &TreeParams) -> Result<Self> {
        if targets.is_empty() {
            return Err(PipelineError::data(Stage::Model, "cannot fit a tree on zero samples"));
        }
        if columns.is_empty() {
            return Err(PipelineError::data(Stage::Model, "cannot fit a tree without features"));
        }
        if let Some(j) = columns.iter().position(|c| c.len() != targets.len()) {
            return Err(PipelineError::data(
                Stage::Model,
                format!(
                    "feature {} has {} values but there are {} targets",
                    j,
                    columns[j].len(),
                    targets.len()
                ),
            ));
        }

        let n_features = columns.len();
        let mut builder = Builder {
            columns,
            targets,
            params,
            max_features: params.max_features.resolve(n_features),
            rng: StdRng::seed_from_u64(params.seed),
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.build((0..targets.len()).collect(), 0);

        let mut feature_importances = builder.importances;
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            feature_importances.iter_mut().for_each(|v| *v /= total);
        }

        let tree = Self {
            nodes: builder.nodes,
            n_features,
            feature_importances,
        };
        tracing::debug!(
            samples = targets.len(),
            depth = tree.depth(),
            leaves = tree.n_leaves(),
            "fitted regression tree"
        );
        Ok(tree)
    }

    /// Predict one sample given its feature values in fit order
    pub fn predict(&self, sample: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    id = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Edges on the longest root-to-leaf path; a lone leaf has depth 0
    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, id: usize) -> usize {
        match &self.nodes[id] {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + self.depth_from(*left).max(self.depth_from(*right)),
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Normalized total impurity decrease per feature; all zero for a lone leaf
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Text dump of the tree, cut off below `max_depth`
    pub fn render(&self, feature_names: &[String], max_depth: usize) -> String {
        let mut out = String::new();
        self.render_node(0, 0, feature_names, max_depth, &mut out);
        out
    }

    fn render_node(&self, id: usize, depth: usize, names: &[String], max_depth: usize, out: &mut String) {
        let indent = "|   ".repeat(depth);
        match &self.nodes[id] {
            Node::Leaf { value, samples, .. } => {
                out.push_str(&format!("{}|--- value: {:.2} (samples = {})\n", indent, value, samples));
            }
            Node::Split { .. } if depth >= max_depth => {
                out.push_str(&format!(
                    "{}|--- truncated branch of depth {}\n",
                    indent,
                    self.depth_from(id)
                ));
            }
            Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                let name = names
                    .get(*feature)
                    .cloned()
                    .unwrap_or_else(|| format!("feature_{}", feature));
                out.push_str(&format!("{}|--- {} <= {:.2}\n", indent, name, threshold));
                self.render_node(*left, depth + 1, names, max_depth, out);
                out.push_str(&format!("{}|--- {} >  {:.2}\n", indent, name, threshold));
                self.render_node(*right, depth + 1, names, max_depth, out);
            }
        }
    }
}
