//! Demand forecasting pipeline.
//!
//! Order lines are folded into per-product daily series (`sales`), featurized
//! (`features`), turned into time-split supervised examples (`dataset`), fitted
//! by the candidate regressors (`tree`, `forest`, `boosting`) and selected
//! against a rolling-mean baseline (`trainer`). The selected model is persisted
//! through an [`artifact::ArtifactStore`] and consumed by the recursive
//! projection in `projection`.

pub mod artifact;
pub mod boosting;
pub mod dataset;
pub mod features;
pub mod forest;
pub mod projection;
pub mod regressor;
pub mod sales;
pub mod trainer;
pub mod tree;

pub use dataset::{InsufficientData, TrainingExample, TrainingSplit};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES, FEATURE_SET};
pub use projection::{PredictionSource, ProductProjection};
pub use regressor::{ForecastModel, Regressor};
pub use sales::{DailySalesSeries, DemandAverages};
