use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::errors::ForecastError;
use crate::forecast::features::FEATURE_COUNT;
use crate::forecast::regressor::{check_training_input, Regressor};
use crate::forecast::tree::{CartBuilder, RegressionTree, TreeParams};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl From<&TrainingConfig> for ForestParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            trees: config.forest_trees,
            max_depth: config.forest_max_depth,
            min_samples_leaf: config.forest_min_samples_leaf,
            seed: config.seed,
        }
    }
}

/// Bagged CART ensemble; the prediction is the mean over trees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub const NAME: &'static str = "random_forest";

    pub fn new(params: ForestParams) -> Self {
        Self { params, trees: Vec::new() }
    }
}

impl Regressor for RandomForest {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]], targets: &[f64]) -> Result<(), ForecastError> {
        check_training_input(Self::NAME, rows, targets)?;

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let builder = CartBuilder::new(
            rows,
            targets,
            TreeParams {
                max_depth: self.params.max_depth,
                min_samples_leaf: self.params.min_samples_leaf,
            },
        );

        let sample_count = rows.len();
        self.trees = (0..self.params.trees.max(1))
            .map(|_| {
                let bootstrap: Vec<usize> =
                    (0..sample_count).map(|_| rng.gen_range(0..sample_count)).collect();
                builder.build(&bootstrap)
            })
            .collect();

        tracing::debug!(
            event_name = "forecast.model.fitted",
            model_name = Self::NAME,
            tree_count = self.trees.len(),
            sample_count,
            deepest_tree = self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            "random forest fitted"
        );
        Ok(())
    }

    fn predict(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}
