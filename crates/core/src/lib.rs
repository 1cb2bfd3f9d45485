pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod forecast;
pub mod recommend;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::forecast::ProductForecast;
pub use domain::order::{OrderId, OrderLine};
pub use domain::product::{CatalogProduct, ProductId};
pub use domain::recommendation::ProductRecommendation;
pub use errors::{ArtifactError, ForecastError};
pub use forecast::artifact::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
pub use forecast::trainer::{ForecastArtifact, ModelMetadata, TrainingOutcome};
pub use recommend::{RecommendationSet, SimilarityEngine};
