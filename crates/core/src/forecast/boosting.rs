//! Histogram gradient boosting on squared error.
//!
//! Features are bucketed once into at most `max_bins` quantile bins; split
//! search then scans per-bin gradient histograms instead of sorted values.
//! Leaf values carry the learning rate, so a fitted model predicts
//! `bias + sum(tree outputs)`.

use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::errors::ForecastError;
use crate::forecast::features::FEATURE_COUNT;
use crate::forecast::regressor::{check_training_input, Regressor};
use crate::forecast::tree::{partition, RegressionTree, TreeNode};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_bins: usize,
}

impl From<&TrainingConfig> for BoostingParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            iterations: config.boosting_iterations,
            learning_rate: config.boosting_learning_rate,
            max_depth: config.boosting_max_depth,
            min_samples_leaf: config.boosting_min_samples_leaf,
            max_bins: config.boosting_max_bins,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub params: BoostingParams,
    pub bias: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub const NAME: &'static str = "hist_gradient_boosting";

    pub fn new(params: BoostingParams) -> Self {
        Self { params, bias: 0.0, trees: Vec::new() }
    }
}

impl Regressor for GradientBoosting {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]], targets: &[f64]) -> Result<(), ForecastError> {
        check_training_input(Self::NAME, rows, targets)?;

        let bins = BinMapper::fit(rows, self.params.max_bins.clamp(2, 255));
        let binned = bins.transform(rows);

        self.bias = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![self.bias; targets.len()];
        let mut gradients = vec![0.0; targets.len()];
        self.trees = Vec::with_capacity(self.params.iterations);

        for _ in 0..self.params.iterations {
            for ((gradient, prediction), target) in
                gradients.iter_mut().zip(&predictions).zip(targets)
            {
                *gradient = prediction - target;
            }

            let grower = HistogramGrower {
                binned: &binned,
                bins: &bins,
                gradients: &gradients,
                params: &self.params,
            };
            let tree = grower.grow();

            for (prediction, row) in predictions.iter_mut().zip(rows) {
                *prediction += tree.predict(row);
            }
            self.trees.push(tree);
        }

        tracing::debug!(
            event_name = "forecast.model.fitted",
            model_name = Self::NAME,
            tree_count = self.trees.len(),
            sample_count = rows.len(),
            deepest_tree = self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            "gradient boosting fitted"
        );
        Ok(())
    }

    fn predict(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        self.bias + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }
}

/// Per-feature upper bin edges. A value `v` falls in the first bin `b` with
/// `v <= edges[b]`; values above every edge land in the last bin.
struct BinMapper {
    edges: Vec<Vec<f64>>,
}

impl BinMapper {
    fn fit(rows: &[[f64; FEATURE_COUNT]], max_bins: usize) -> Self {
        let edges = (0..FEATURE_COUNT)
            .map(|feature| {
                let mut distinct: Vec<f64> = rows.iter().map(|row| row[feature]).collect();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup();

                if distinct.len() <= max_bins {
                    distinct.windows(2).map(|pair| pair[0] + (pair[1] - pair[0]) / 2.0).collect()
                } else {
                    let mut edges: Vec<f64> = (1..max_bins)
                        .map(|bin| {
                            let position = bin * (distinct.len() - 1) / max_bins;
                            distinct[position] + (distinct[position + 1] - distinct[position]) / 2.0
                        })
                        .collect();
                    edges.dedup();
                    edges
                }
            })
            .collect();
        Self { edges }
    }

    fn transform(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<[u8; FEATURE_COUNT]> {
        rows.iter()
            .map(|row| {
                let mut binned = [0u8; FEATURE_COUNT];
                for (feature, bin) in binned.iter_mut().enumerate() {
                    let edges = &self.edges[feature];
                    *bin = edges.partition_point(|edge| *edge < row[feature]) as u8;
                }
                binned
            })
            .collect()
    }

    fn bin_count(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }
}

struct HistogramGrower<'a> {
    binned: &'a [[u8; FEATURE_COUNT]],
    bins: &'a BinMapper,
    gradients: &'a [f64],
    params: &'a BoostingParams,
}

struct BinSplit {
    feature: usize,
    bin: usize,
    gain: f64,
}

impl HistogramGrower<'_> {
    fn grow(&self) -> RegressionTree {
        let mut nodes = Vec::new();
        let mut indices: Vec<usize> = (0..self.gradients.len()).collect();
        self.grow_node(&mut indices, 0, &mut nodes);
        RegressionTree { nodes }
    }

    fn grow_node(&self, indices: &mut [usize], depth: usize, nodes: &mut Vec<TreeNode>) -> usize {
        let current = nodes.len();
        let gradient_sum: f64 = indices.iter().map(|&index| self.gradients[index]).sum();
        // Newton step with unit hessians, shrunk by the learning rate.
        let leaf_value = if indices.is_empty() {
            0.0
        } else {
            -gradient_sum / indices.len() as f64 * self.params.learning_rate
        };

        let min_leaf = self.params.min_samples_leaf.max(1);
        if depth >= self.params.max_depth || indices.len() < 2 * min_leaf {
            nodes.push(TreeNode::leaf(leaf_value));
            return current;
        }

        let Some(split) = self.best_split(indices, gradient_sum, min_leaf) else {
            nodes.push(TreeNode::leaf(leaf_value));
            return current;
        };

        let boundary =
            partition(indices, |index| usize::from(self.binned[index][split.feature]) <= split.bin);
        nodes.push(TreeNode::split(split.feature, self.bins.edges[split.feature][split.bin]));

        let (left_indices, right_indices) = indices.split_at_mut(boundary);
        let left = self.grow_node(left_indices, depth + 1, nodes);
        let right = self.grow_node(right_indices, depth + 1, nodes);
        nodes[current].left = left;
        nodes[current].right = right;

        current
    }

    fn best_split(
        &self,
        indices: &[usize],
        gradient_sum: f64,
        min_leaf: usize,
    ) -> Option<BinSplit> {
        let total = indices.len();
        let parent_score = gradient_sum * gradient_sum / total as f64;
        let mut best: Option<BinSplit> = None;

        for feature in 0..FEATURE_COUNT {
            let bin_count = self.bins.bin_count(feature);
            if bin_count < 2 {
                continue;
            }

            let mut histogram = vec![(0.0f64, 0usize); bin_count];
            for &index in indices {
                let slot = &mut histogram[usize::from(self.binned[index][feature])];
                slot.0 += self.gradients[index];
                slot.1 += 1;
            }

            let mut left_gradient = 0.0;
            let mut left_count = 0usize;
            // The last bin has no edge to split on.
            for (bin, (gradient, count)) in histogram.iter().enumerate().take(bin_count - 1) {
                left_gradient += gradient;
                left_count += count;
                let right_count = total - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }

                let right_gradient = gradient_sum - left_gradient;
                let gain = left_gradient * left_gradient / left_count as f64
                    + right_gradient * right_gradient / right_count as f64
                    - parent_score;

                if gain > 1e-12 && best.as_ref().map_or(true, |current| gain > current.gain) {
                    best = Some(BinSplit { feature, bin, gain });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::{BinMapper, BoostingParams, GradientBoosting};
    use crate::forecast::features::FEATURE_COUNT;
    use crate::forecast::regressor::Regressor;

    fn params() -> BoostingParams {
        BoostingParams {
            iterations: 60,
            learning_rate: 0.2,
            max_depth: 3,
            min_samples_leaf: 2,
            max_bins: 255,
        }
    }

    fn row(value: f64) -> [f64; FEATURE_COUNT] {
        let mut row = [0.0; FEATURE_COUNT];
        row[1] = value;
        row
    }

    #[test]
    fn constant_target_predicts_the_mean() {
        let rows: Vec<_> = (0..30).map(|value| row(f64::from(value))).collect();
        let targets = vec![3.0; 30];
        let mut model = GradientBoosting::new(params());
        model.fit(&rows, &targets).expect("fit");

        assert_eq!(model.bias, 3.0);
        assert!((model.predict(&row(12.0)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn converges_on_a_step_function() {
        let rows: Vec<_> = (0..40).map(|value| row(f64::from(value))).collect();
        let targets: Vec<f64> = (0..40).map(|value| if value < 20 { 1.0 } else { 5.0 }).collect();
        let mut model = GradientBoosting::new(params());
        model.fit(&rows, &targets).expect("fit");

        assert!((model.predict(&row(3.0)) - 1.0).abs() < 0.05);
        assert!((model.predict(&row(33.0)) - 5.0).abs() < 0.05);
    }

    #[test]
    fn bins_are_capped() {
        let rows: Vec<_> = (0..1000).map(|value| row(f64::from(value))).collect();
        let mapper = BinMapper::fit(&rows, 16);
        assert!(mapper.bin_count(1) <= 16);
        assert_eq!(mapper.bin_count(0), 1);

        let binned = mapper.transform(&rows);
        assert_eq!(binned[0][1], 0);
        assert_eq!(usize::from(binned[999][1]), mapper.bin_count(1) - 1);
    }
}
