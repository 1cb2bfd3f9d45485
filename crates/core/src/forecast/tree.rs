//! Regression tree shared by both ensembles.
//!
//! Nodes are stored flat; a node with `value` set is a leaf, otherwise samples
//! with `features[feature] <= threshold` go left.

use serde::{Deserialize, Serialize};

use crate::forecast::features::FEATURE_COUNT;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    pub value: Option<f64>,
}

impl TreeNode {
    pub fn leaf(value: f64) -> Self {
        Self { feature: 0, threshold: 0.0, left: 0, right: 0, value: Some(value) }
    }

    pub fn split(feature: usize, threshold: f64) -> Self {
        Self { feature, threshold, left: 0, right: 0, value: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut index = 0usize;
        loop {
            let Some(node) = self.nodes.get(index) else {
                return 0.0;
            };
            if let Some(value) = node.value {
                return value;
            }
            index = if features[node.feature] <= node.threshold { node.left } else { node.right };
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match nodes.get(index) {
                Some(node) if node.value.is_none() => {
                    1 + walk(nodes, node.left).max(walk(nodes, node.right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

/// Exact-greedy CART on squared error. `indices` may repeat rows, which is how
/// bootstrap resamples are expressed.
pub struct CartBuilder<'a> {
    rows: &'a [[f64; FEATURE_COUNT]],
    targets: &'a [f64],
    params: TreeParams,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<'a> CartBuilder<'a> {
    pub fn new(rows: &'a [[f64; FEATURE_COUNT]], targets: &'a [f64], params: TreeParams) -> Self {
        Self { rows, targets, params }
    }

    pub fn build(&self, indices: &[usize]) -> RegressionTree {
        let mut nodes = Vec::new();
        let mut working = indices.to_vec();
        self.build_node(&mut working, 0, &mut nodes);
        RegressionTree { nodes }
    }

    fn build_node(&self, indices: &mut [usize], depth: usize, nodes: &mut Vec<TreeNode>) -> usize {
        let current = nodes.len();
        let leaf_value = self.mean(indices);

        let min_leaf = self.params.min_samples_leaf.max(1);
        if depth >= self.params.max_depth || indices.len() < 2 * min_leaf {
            nodes.push(TreeNode::leaf(leaf_value));
            return current;
        }

        let Some(split) = self.find_best_split(indices, min_leaf) else {
            nodes.push(TreeNode::leaf(leaf_value));
            return current;
        };

        let boundary = partition(indices, |index| {
            self.rows[index][split.feature] <= split.threshold
        });
        nodes.push(TreeNode::split(split.feature, split.threshold));

        let (left_indices, right_indices) = indices.split_at_mut(boundary);
        let left = self.build_node(left_indices, depth + 1, nodes);
        let right = self.build_node(right_indices, depth + 1, nodes);
        nodes[current].left = left;
        nodes[current].right = right;

        current
    }

    fn find_best_split(&self, indices: &[usize], min_leaf: usize) -> Option<Split> {
        let total_count = indices.len() as f64;
        let total_sum: f64 = indices.iter().map(|&index| self.targets[index]).sum();
        let parent_score = total_sum * total_sum / total_count;

        let mut best: Option<Split> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..FEATURE_COUNT {
            sorted.sort_by(|a, b| self.rows[*a][feature].total_cmp(&self.rows[*b][feature]));

            let mut left_sum = 0.0;
            for position in 0..sorted.len() - 1 {
                left_sum += self.targets[sorted[position]];
                let left_count = position + 1;
                let right_count = sorted.len() - left_count;

                let current_value = self.rows[sorted[position]][feature];
                let next_value = self.rows[sorted[position + 1]][feature];
                if current_value == next_value {
                    continue;
                }
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_score;

                if gain > 1e-12 && best.as_ref().map_or(true, |current| gain > current.gain) {
                    best = Some(Split {
                        feature,
                        threshold: current_value + (next_value - current_value) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn mean(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        indices.iter().map(|&index| self.targets[index]).sum::<f64>() / indices.len() as f64
    }
}

/// In-place partition; returns the count of elements satisfying `goes_left`.
pub(crate) fn partition(indices: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut boundary = 0;
    for position in 0..indices.len() {
        if goes_left(indices[position]) {
            indices.swap(boundary, position);
            boundary += 1;
        }
    }
    boundary
}
